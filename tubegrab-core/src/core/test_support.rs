//! Scripted engine and recording emitter for driving tasks in tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::engine::{
    DownloadRequest, Engine, EngineConfig, EngineHooks, HookFlow, PostprocessStatus,
    ProgressReport, TransferStatus,
};
use crate::core::events::{Event, EventEmitter};
use crate::error::EngineError;
use crate::models::media::{MediaInfo, RawFormat};

pub type Hook = Arc<dyn Fn() + Send + Sync>;

pub enum Step {
    Progress {
        done: u64,
        total: Option<u64>,
        speed: Option<f64>,
    },
    Postprocess(PostprocessStatus),
    /// Writes a file named `{output stem}{suffix}` next to the current output.
    Fragment(&'static str),
    /// Writes the current output target.
    Output,
    Run(Hook),
    Fail(EngineError),
}

pub fn progress(done: u64, total: u64, speed: f64) -> Step {
    Step::Progress {
        done,
        total: Some(total),
        speed: Some(speed),
    }
}

#[derive(Default)]
pub struct ScriptedEngine {
    steps: Vec<Step>,
    info: Option<MediaInfo>,
    extract_error: Option<EngineError>,
    before_extract: Option<Hook>,
    pub downloads: AtomicUsize,
    pub extracts: AtomicUsize,
    pub requests: Mutex<Vec<EngineConfig>>,
}

impl ScriptedEngine {
    pub fn with_steps(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    pub fn with_info(info: MediaInfo) -> Self {
        Self {
            info: Some(info),
            ..Self::default()
        }
    }

    pub fn failing_extract(error: EngineError) -> Self {
        Self {
            extract_error: Some(error),
            ..Self::default()
        }
    }

    pub fn info(mut self, info: MediaInfo) -> Self {
        self.info = Some(info);
        self
    }

    pub fn before_extract(mut self, hook: Hook) -> Self {
        self.before_extract = Some(hook);
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl Engine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn extract(&self, _url: &str, _config: &EngineConfig) -> Result<MediaInfo, EngineError> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.before_extract {
            hook();
        }
        if let Some(error) = &self.extract_error {
            return Err(clone_error(error));
        }
        Ok(self.info.clone().unwrap_or_default())
    }

    fn download(
        &self,
        request: &DownloadRequest<'_>,
        hooks: &mut dyn EngineHooks,
    ) -> Result<(), EngineError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.config.clone());

        for step in &self.steps {
            let flow = match step {
                Step::Progress { done, total, speed } => hooks.on_progress(&ProgressReport {
                    status: TransferStatus::Downloading,
                    downloaded_bytes: *done,
                    total_bytes: *total,
                    speed: *speed,
                }),
                Step::Postprocess(status) => hooks.on_postprocess(*status),
                Step::Fragment(suffix) => {
                    let output = request.output.current();
                    if let Some(path) = sibling(&output, suffix) {
                        std::fs::write(path, b"fragment")?;
                    }
                    HookFlow::Continue
                }
                Step::Output => {
                    std::fs::write(request.output.current(), b"media")?;
                    HookFlow::Continue
                }
                Step::Run(hook) => {
                    hook();
                    HookFlow::Continue
                }
                Step::Fail(error) => return Err(clone_error(error)),
            };
            if flow == HookFlow::Abort {
                return Err(EngineError::Aborted);
            }
        }
        Ok(())
    }
}

/// `None` when the output has been redirected to the null device.
fn sibling(output: &std::path::Path, suffix: &str) -> Option<PathBuf> {
    if output == crate::core::engine::null_device() {
        return None;
    }
    let stem = output.file_stem()?.to_str()?;
    Some(output.with_file_name(format!("{stem}{suffix}")))
}

fn clone_error(error: &EngineError) -> EngineError {
    match error {
        EngineError::Network { reason } => EngineError::Network {
            reason: reason.clone(),
        },
        EngineError::Extraction { reason } => EngineError::Extraction {
            reason: reason.clone(),
        },
        EngineError::UnsupportedUrl { url } => EngineError::UnsupportedUrl { url: url.clone() },
        EngineError::Timeout { reason } => EngineError::Timeout {
            reason: reason.clone(),
        },
        EngineError::Filesystem { source } => EngineError::Filesystem {
            source: std::io::Error::new(source.kind(), source.to_string()),
        },
        EngineError::Spawn { reason } => EngineError::Spawn {
            reason: reason.clone(),
        },
        EngineError::Aborted => EngineError::Aborted,
    }
}

#[derive(Clone, Default)]
pub struct RecordingEmitter {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingEmitter {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn terminal_count(&self, id: u64) -> usize {
        self.events()
            .iter()
            .filter(|e| e.source_id() == id && e.is_terminal())
            .count()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn raw_format(id: &str, ext: &str, height: Option<u32>, vcodec: &str, acodec: &str) -> RawFormat {
    RawFormat {
        format_id: Some(id.to_string()),
        ext: Some(ext.to_string()),
        height,
        filesize: None,
        filesize_approx: None,
        vcodec: Some(vcodec.to_string()),
        acodec: Some(acodec.to_string()),
    }
}
