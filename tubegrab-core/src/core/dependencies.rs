use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::DependencyError;
use crate::fs_paths::{AppPaths, DesktopPaths};
use crate::models::settings::AppSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    YtDlp,
    Ffmpeg,
}

impl Tool {
    pub fn name(self) -> &'static str {
        match self {
            Tool::YtDlp => "yt-dlp",
            Tool::Ffmpeg => "ffmpeg",
        }
    }

    fn bin_name(self) -> String {
        if cfg!(target_os = "windows") {
            format!("{}.exe", self.name())
        } else {
            self.name().to_string()
        }
    }

    fn version_flag(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "-version",
            Tool::YtDlp => "--version",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInfo {
    pub path: PathBuf,
    pub version: String,
}

/// Finds a working copy of `tool`: the configured override first, then the
/// managed bin directory, then the Flatpak runtime, then `PATH`.
pub async fn locate(tool: Tool, configured: Option<&Path>) -> Option<ToolInfo> {
    let timer = std::time::Instant::now();
    let name = tool.bin_name();

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(path) = configured {
        candidates.push(path.to_path_buf());
    }
    if let Some(bin_dir) = DesktopPaths.bin_dir() {
        let managed = bin_dir.join(&name);
        if managed.exists() {
            candidates.push(managed);
        }
    }
    #[cfg(target_os = "linux")]
    {
        let flatpak = PathBuf::from("/app/bin").join(&name);
        if flatpak.exists() {
            candidates.push(flatpak);
        }
    }
    candidates.push(PathBuf::from(&name));

    for candidate in candidates {
        match probe(tool, &candidate).await {
            Ok(version) => {
                tracing::debug!("locate({}) took {:?}", tool.name(), timer.elapsed());
                return Some(ToolInfo {
                    path: candidate,
                    version,
                });
            }
            Err(reason) => {
                tracing::debug!("{} candidate {} rejected: {}", tool.name(), candidate.display(), reason);
            }
        }
    }

    tracing::debug!("locate({}) took {:?}", tool.name(), timer.elapsed());
    None
}

/// Runs the tool's version command and returns the parsed version.
pub async fn probe(tool: Tool, path: &Path) -> Result<String, DependencyError> {
    let broken = |reason: String| DependencyError::Broken {
        tool: tool.name().to_string(),
        path: path.to_path_buf(),
        reason,
    };

    let output = crate::core::process::command(path)
        .arg(tool.version_flag())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| broken(e.to_string()))?;

    if !output.status.success() {
        return Err(broken(format!("exited with {}", output.status)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_version(tool, &stdout).ok_or_else(|| broken("unrecognized version output".to_string()))
}

pub fn parse_version(tool: Tool, stdout: &str) -> Option<String> {
    let first_line = stdout.lines().next()?.trim();
    match tool {
        // "ffmpeg version 6.1.1-3ubuntu5 Copyright (c) ..."
        Tool::Ffmpeg => first_line.split_whitespace().nth(2).map(str::to_string),
        Tool::YtDlp if first_line.is_empty() => None,
        Tool::YtDlp => Some(first_line.to_string()),
    }
}

/// yt-dlp is required; without it nothing can be searched or downloaded.
pub async fn require_ytdlp(settings: &AppSettings) -> Result<ToolInfo, DependencyError> {
    let configured = settings.engine.ytdlp_location.as_deref();
    match locate(Tool::YtDlp, configured).await {
        Some(info) => {
            tracing::info!("yt-dlp {} at {}", info.version, info.path.display());
            Ok(info)
        }
        None => Err(DependencyError::Missing {
            tool: Tool::YtDlp.name().to_string(),
            searched: DesktopPaths.bin_dir().unwrap_or_default(),
        }),
    }
}

/// ffmpeg is optional: without it the engine can still fetch pre-merged
/// encodings, but split formats cannot be merged.
pub async fn optional_ffmpeg(settings: &AppSettings) -> Option<ToolInfo> {
    let configured = settings.engine.ffmpeg_location.as_deref();
    let found = locate(Tool::Ffmpeg, configured).await;
    match &found {
        Some(info) => tracing::info!("ffmpeg {} at {}", info.version, info.path.display()),
        None => tracing::warn!("ffmpeg not found; split formats will not be merged"),
    }
    found
}
