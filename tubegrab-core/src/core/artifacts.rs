//! Leftovers a transfer can leave next to its destination file.
//!
//! For a destination `dir/{base}.{ext}` the engine may write
//! `{base}.f<digits>.{ext}` per-substream files, their `.part` siblings and
//! `{base}.{ext}.part` for the merged output. None of it survives a task.

use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::CleanupError;

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<CleanupError>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn part_path_for(output: &Path) -> PathBuf {
    let mut part = output.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

/// Removes fragment and partial-transfer artifacts belonging to `destination`.
///
/// Never fails: problems are collected in the report and logged.
pub fn cleanup_artifacts(destination: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();

    remove_if_present(&part_path_for(destination), &mut report);

    let Some(dir) = destination.parent() else {
        return report;
    };
    let Some(matcher) = fragment_matcher(destination) else {
        return report;
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
        Err(e) => {
            report.failures.push(CleanupError {
                path: dir.to_path_buf(),
                source: e,
            });
            log_failures(&report);
            return report;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if matcher.is_match(name) {
            remove_if_present(&entry.path(), &mut report);
        }
    }

    log_failures(&report);
    if !report.removed.is_empty() {
        tracing::debug!(
            "removed {} leftover artifact(s) for {}",
            report.removed.len(),
            destination.display()
        );
    }
    report
}

/// Removes the destination itself and its `.part` sibling. Used when a task
/// was cancelled, on top of [`cleanup_artifacts`].
pub fn discard_destination(destination: &Path) -> CleanupReport {
    let mut report = CleanupReport::default();
    remove_if_present(destination, &mut report);
    remove_if_present(&part_path_for(destination), &mut report);
    log_failures(&report);
    report
}

fn fragment_matcher(destination: &Path) -> Option<Regex> {
    let file_name = destination.file_name()?.to_str()?;
    let (base, ext) = match file_name.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() => (base, Some(ext)),
        _ => (file_name, None),
    };
    // The substream keeps its own container (an .m4a audio part next to an
    // .mp4 destination), so any extension is accepted after the tag.
    let pattern = match ext {
        Some(_) => format!(r"^{}\.f\d+\.[A-Za-z0-9]+(\.part)?$", regex::escape(base)),
        None => format!(r"^{}\.f\d+(\.[A-Za-z0-9]+)?(\.part)?$", regex::escape(base)),
    };
    Regex::new(&pattern).ok()
}

fn remove_if_present(path: &Path, report: &mut CleanupReport) {
    match std::fs::remove_file(path) {
        Ok(()) => report.removed.push(path.to_path_buf()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => report.failures.push(CleanupError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn log_failures(report: &CleanupReport) {
    for failure in &report.failures {
        tracing::warn!("cleanup: {}", failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(part_path_for(Path::new("video.mp4")), PathBuf::from("video.mp4.part"));
    }

    #[test]
    fn part_path_nested() {
        assert_eq!(
            part_path_for(Path::new("downloads/clip/video.mp4")),
            PathBuf::from("downloads/clip/video.mp4.part")
        );
    }

    #[test]
    fn cleanup_with_no_artifacts_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let report = cleanup_artifacts(&dir.path().join("t_720p.mp4"));
        assert!(report.is_clean());
        assert!(report.removed.is_empty());
    }

    #[test]
    fn cleanup_removes_single_part_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "t_720p.mp4.part");
        let report = cleanup_artifacts(&dir.path().join("t_720p.mp4"));
        assert_eq!(report.removed.len(), 1);
        assert!(names(dir.path()).is_empty());
    }

    #[test]
    fn cleanup_removes_many_fragments_and_keeps_result() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "t_720p.mp4");
        touch(dir.path(), "t_720p.f137.mp4");
        touch(dir.path(), "t_720p.f137.mp4.part");
        touch(dir.path(), "t_720p.f140.m4a");
        touch(dir.path(), "t_720p.f140.m4a.part");
        touch(dir.path(), "t_720p.mp4.part");
        touch(dir.path(), "other_720p.f137.mp4");

        let report = cleanup_artifacts(&dir.path().join("t_720p.mp4"));
        assert!(report.is_clean());
        assert_eq!(report.removed.len(), 5);
        assert_eq!(names(dir.path()), vec!["other_720p.f137.mp4", "t_720p.mp4"]);
    }

    #[test]
    fn cleanup_ignores_names_that_only_look_similar() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "t_720p.fx.mp4");
        touch(dir.path(), "t_720p_1.f137.mp4");
        cleanup_artifacts(&dir.path().join("t_720p.mp4"));
        assert_eq!(names(dir.path()), vec!["t_720p.fx.mp4", "t_720p_1.f137.mp4"]);
    }

    #[test]
    fn cleanup_escapes_regex_characters_in_title() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a+b (live)_1080p.f299.mp4");
        touch(dir.path(), "aab (live)_1080p.f299.mp4");
        cleanup_artifacts(&dir.path().join("a+b (live)_1080p.mp4"));
        assert_eq!(names(dir.path()), vec!["aab (live)_1080p.f299.mp4"]);
    }

    #[test]
    fn cleanup_in_missing_directory_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let report = cleanup_artifacts(&dir.path().join("gone").join("t.mp4"));
        assert!(report.is_clean());
    }

    #[test]
    fn discard_removes_destination_and_part() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "t.mp4");
        touch(dir.path(), "t.mp4.part");
        let report = discard_destination(&dir.path().join("t.mp4"));
        assert_eq!(report.removed.len(), 2);
        assert!(names(dir.path()).is_empty());
    }
}
