//! Contract with the external extraction/download engine.
//!
//! The engine is blocking: `extract` and `download` occupy the calling
//! thread for their whole duration. Progress and post-processing are
//! reported through [`EngineHooks`]; a hook answering [`HookFlow::Abort`]
//! asks the engine to unwind, which it signals with
//! [`EngineError::Aborted`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::EngineError;
use crate::models::media::MediaInfo;
use crate::models::settings::AppSettings;

pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, url: &str, config: &EngineConfig) -> Result<MediaInfo, EngineError>;

    fn download(
        &self,
        request: &DownloadRequest<'_>,
        hooks: &mut dyn EngineHooks,
    ) -> Result<(), EngineError>;
}

pub trait EngineHooks {
    fn on_progress(&mut self, report: &ProgressReport) -> HookFlow;
    fn on_postprocess(&mut self, status: PostprocessStatus) -> HookFlow;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFlow {
    Continue,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Downloading,
    Finished,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub status: TransferStatus,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Instantaneous speed in bytes per second.
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostprocessStatus {
    Started,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub ffmpeg_location: Option<PathBuf>,
    pub format_selector: Option<String>,
    pub output_template: Option<PathBuf>,
    pub merge_output_format: String,
    pub retries: u32,
    pub fragment_retries: u32,
    pub skip_unavailable_fragments: bool,
    pub keep_video: bool,
    pub overwrite: bool,
}

impl EngineConfig {
    /// Base configuration shared by every engine call of a session.
    /// `ffmpeg_location` is resolved once at startup and injected here.
    pub fn from_settings(settings: &AppSettings, ffmpeg_location: Option<PathBuf>) -> Self {
        Self {
            ffmpeg_location,
            format_selector: None,
            output_template: None,
            merge_output_format: settings.download.merge_output_format.clone(),
            retries: settings.engine.retries,
            fragment_retries: settings.engine.fragment_retries,
            skip_unavailable_fragments: settings.engine.skip_unavailable_fragments,
            keep_video: settings.engine.keep_video,
            overwrite: settings.engine.overwrite,
        }
    }

    pub fn for_download(&self, format_id: &str, destination: &Path) -> Self {
        Self {
            format_selector: Some(format!("{format_id}+bestaudio/best")),
            output_template: Some(destination.to_path_buf()),
            ..self.clone()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&AppSettings::default(), None)
    }
}

pub struct DownloadRequest<'a> {
    pub url: &'a str,
    pub format_id: &'a str,
    pub output: &'a OutputTarget,
    pub config: &'a EngineConfig,
}

/// Where the engine writes its result.
///
/// Shared between a running task and its cancel handle: cancelling points
/// it at the platform null device so writes still in flight land nowhere.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    inner: Arc<Mutex<OutputState>>,
}

#[derive(Debug)]
struct OutputState {
    path: PathBuf,
    discarded: bool,
}

impl OutputTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(OutputState {
                path: path.into(),
                discarded: false,
            })),
        }
    }

    pub fn current(&self) -> PathBuf {
        let state = self.lock();
        if state.discarded {
            null_device()
        } else {
            state.path.clone()
        }
    }

    pub fn set(&self, path: impl Into<PathBuf>) {
        let mut state = self.lock();
        if !state.discarded {
            state.path = path.into();
        }
    }

    /// Returns `true` only for the call that performed the redirect.
    pub fn redirect_to_discard(&self) -> bool {
        let mut state = self.lock();
        !std::mem::replace(&mut state.discarded, true)
    }

    pub fn is_discarded(&self) -> bool {
        self.lock().discarded
    }

    fn lock(&self) -> MutexGuard<'_, OutputState> {
        // The state is two plain fields; a panic elsewhere cannot leave it torn.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn null_device() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from("NUL")
    } else {
        PathBuf::from("/dev/null")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_config_uses_bestaudio_selector() {
        let base = EngineConfig::default();
        let cfg = base.for_download("137", Path::new("/tmp/out.mp4"));
        assert_eq!(cfg.format_selector.as_deref(), Some("137+bestaudio/best"));
        assert_eq!(cfg.output_template.as_deref(), Some(Path::new("/tmp/out.mp4")));
        assert_eq!(cfg.retries, 10);
        assert_eq!(cfg.fragment_retries, 10);
        assert!(cfg.overwrite);
        assert!(!cfg.keep_video);
    }

    #[test]
    fn redirect_happens_once() {
        let target = OutputTarget::new("/tmp/a.mp4");
        assert!(target.redirect_to_discard());
        assert!(!target.redirect_to_discard());
        assert_eq!(target.current(), null_device());
    }

    #[test]
    fn set_after_discard_is_ignored() {
        let target = OutputTarget::new("/tmp/a.mp4");
        target.redirect_to_discard();
        target.set("/tmp/b.mp4");
        assert!(target.is_discarded());
        assert_eq!(target.current(), null_device());
    }

    #[test]
    fn clones_share_state() {
        let target = OutputTarget::new("/tmp/a.mp4");
        let handle = target.clone();
        handle.redirect_to_discard();
        assert!(target.is_discarded());
    }
}
