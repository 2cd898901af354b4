//! Command builders for the external tools.
//!
//! Both variants put the managed bin directory ahead of `PATH` so yt-dlp
//! finds a managed ffmpeg, and force UTF-8 output from the Python runtime.
//! On Unix children get their own process group, so a terminal Ctrl-C
//! reaches only this process and downloads stop through cancellation.

use std::ffi::OsStr;

use crate::fs_paths::{AppPaths, DesktopPaths};

fn enhanced_path() -> Option<std::ffi::OsString> {
    let bin_dir = DesktopPaths.bin_dir()?;
    let current = std::env::var_os("PATH").unwrap_or_default();
    let mut entries = vec![bin_dir];
    entries.extend(std::env::split_paths(&current));
    std::env::join_paths(entries).ok()
}

pub fn command<S: AsRef<OsStr>>(program: S) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(0x08000000);
    #[cfg(unix)]
    cmd.process_group(0);
    if let Some(path) = enhanced_path() {
        cmd.env("PATH", path);
    }
    cmd.env("PYTHONIOENCODING", "utf-8");
    cmd.env("PYTHONUTF8", "1");
    cmd
}

/// Blocking variant, used from engine worker threads.
pub fn std_command<S: AsRef<OsStr>>(program: S) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(0x08000000);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    if let Some(path) = enhanced_path() {
        cmd.env("PATH", path);
    }
    cmd.env("PYTHONIOENCODING", "utf-8");
    cmd.env("PYTHONUTF8", "1");
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn child_leads_its_own_process_group() {
        let output = std_command("sh")
            .args(["-c", "cut -d' ' -f1,5 /proc/$$/stat"])
            .output()
            .unwrap();
        let text = String::from_utf8(output.stdout).unwrap();
        let ids: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(ids.len(), 2, "unexpected stat output {text:?}");
        assert_eq!(ids[0], ids[1]);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn async_child_leads_its_own_process_group() {
        let output = command("sh")
            .args(["-c", "cut -d' ' -f1,5 /proc/$$/stat"])
            .output()
            .await
            .unwrap();
        let text = String::from_utf8(output.stdout).unwrap();
        let ids: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(ids.len(), 2, "unexpected stat output {text:?}");
        assert_eq!(ids[0], ids[1]);
    }
}
