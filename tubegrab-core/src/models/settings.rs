use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::fs_paths::{AppPaths, DesktopPaths};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub advanced: AdvancedSettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    #[serde(default = "default_download_dir")]
    pub standard_download_path: PathBuf,
    #[serde(default)]
    pub last_download_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub load_last_download_path: bool,
    #[serde(default = "default_merge_output_format")]
    pub merge_output_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retries")]
    pub fragment_retries: u32,
    #[serde(default = "default_true")]
    pub skip_unavailable_fragments: bool,
    #[serde(default)]
    pub keep_video: bool,
    #[serde(default = "default_true")]
    pub overwrite: bool,
    #[serde(default)]
    pub ffmpeg_location: Option<PathBuf>,
    #[serde(default)]
    pub ytdlp_location: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedSettings {
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: u32,
}

fn default_true() -> bool {
    true
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn default_log_level() -> String {
    "info".into()
}

fn default_download_dir() -> PathBuf {
    DesktopPaths.downloads_dir()
}

fn default_merge_output_format() -> String {
    "mp4".into()
}

fn default_retries() -> u32 {
    10
}

fn default_max_concurrent_downloads() -> u32 {
    2
}

impl AppSettings {
    /// Directory new downloads land in.
    pub fn effective_download_dir(&self) -> &Path {
        match (&self.download.last_download_path, self.download.load_last_download_path) {
            (Some(last), true) => last,
            _ => &self.download.standard_download_path,
        }
    }

    pub fn remember_download_dir(&mut self, dir: &Path) {
        self.download.last_download_path = Some(dir.to_path_buf());
    }

    /// Worker pool size, never below one.
    pub fn pool_size(&self) -> usize {
        self.advanced.max_concurrent_downloads.max(1) as usize
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            download: DownloadSettings::default(),
            engine: EngineSettings::default(),
            advanced: AdvancedSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            standard_download_path: default_download_dir(),
            last_download_path: None,
            load_last_download_path: true,
            merge_output_format: default_merge_output_format(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            fragment_retries: default_retries(),
            skip_unavailable_fragments: true,
            keep_video: false,
            overwrite: true,
            ffmpeg_location: None,
            ytdlp_location: None,
        }
    }
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent_downloads(),
        }
    }
}
