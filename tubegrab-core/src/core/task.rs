use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::artifacts;
use crate::core::engine::{
    DownloadRequest, Engine, EngineConfig, EngineHooks, HookFlow, OutputTarget, PostprocessStatus,
    ProgressReport,
};
use crate::core::events::{DownloadProgress, Event, EventEmitter, TaskId};
use crate::core::filename;
use crate::core::progress::{self, StreamTracker, COMPLETE_LABEL, MERGING_LABEL};
use crate::error::{EngineError, TaskError};
use crate::models::media::EncodingDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Merging,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(PathBuf),
    Failed(String),
    Cancelled,
}

/// Cancels one task or search.
///
/// The first `cancel` call points the task's output at the null device and
/// raises the flag; later calls, and calls after the task settled, do
/// nothing. The running engine call is not interrupted: the flag is honored
/// at its next callback.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
    output: OutputTarget,
    settled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            output: OutputTarget::new(PathBuf::new()),
            settled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns `true` if this call was the one that cancelled.
    pub fn cancel(&self) -> bool {
        if self.settled.load(Ordering::SeqCst) {
            return false;
        }
        let first = self.output.redirect_to_discard();
        self.token.cancel();
        first
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    pub(crate) fn settle(&self) {
        self.settled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn output(&self) -> &OutputTarget {
        &self.output
    }
}

/// What to download: one encoding of one media item into one directory.
#[derive(Debug, Clone)]
pub struct DownloadSpec {
    pub url: String,
    pub media_title: String,
    pub format: EncodingDescriptor,
    pub destination_dir: PathBuf,
}

/// Byte counters and stream bookkeeping updated from engine callbacks.
#[derive(Debug)]
struct Transfer {
    state: TaskState,
    bytes_total: Option<u64>,
    bytes_done: u64,
    streams: StreamTracker,
    completion_reported: bool,
}

pub struct DownloadTask {
    id: TaskId,
    spec: DownloadSpec,
    control: CancelHandle,
    transfer: Transfer,
    final_path: Option<PathBuf>,
    error: Option<String>,
    terminal_emitted: bool,
}

impl DownloadTask {
    pub fn new(id: TaskId, spec: DownloadSpec) -> Self {
        let single_stream = spec.format.is_merged_format();
        Self {
            id,
            spec,
            control: CancelHandle::new(),
            transfer: Transfer {
                state: TaskState::Pending,
                bytes_total: None,
                bytes_done: 0,
                streams: StreamTracker::new(single_stream),
                completion_reported: false,
            },
            final_path: None,
            error: None,
            terminal_emitted: false,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn media_title(&self) -> &str {
        &self.spec.media_title
    }

    pub fn format(&self) -> &EncodingDescriptor {
        &self.spec.format
    }

    pub fn state(&self) -> TaskState {
        self.transfer.state
    }

    pub fn bytes_total(&self) -> Option<u64> {
        self.transfer.bytes_total
    }

    pub fn bytes_done(&self) -> u64 {
        self.transfer.bytes_done
    }

    /// True when the selected encoding already carries both audio and video.
    /// Whether the engine still post-processes is only known from its
    /// postprocess callback.
    pub fn is_merge_required(&self) -> bool {
        self.spec.format.is_merged_format()
    }

    pub fn final_path(&self) -> Option<&Path> {
        self.final_path.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.control.clone()
    }

    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    /// Runs the task to a terminal state on the calling thread and emits
    /// exactly one terminal event.
    pub fn start<E: EventEmitter>(
        &mut self,
        engine: &dyn Engine,
        base_config: &EngineConfig,
        emitter: &E,
    ) -> TaskOutcome {
        if self.transfer.state != TaskState::Pending {
            tracing::warn!("task {} started twice; ignoring", self.id);
            return self.outcome();
        }

        if self.control.is_cancelled() {
            tracing::info!("task {} cancelled before start", self.id);
            return self.finish(Err(TaskError::CancelledByUser), None, emitter);
        }

        self.transfer.state = TaskState::Running;

        let destination = match self.prepare_destination(&base_config.merge_output_format) {
            Ok(path) => path,
            Err(e) => return self.finish(Err(e), None, emitter),
        };
        self.control.output().set(&destination);
        // Anything already sharing the stem is never taken as this task's output.
        let preexisting = same_stem_outputs(&destination);

        tracing::info!(
            "task {}: downloading '{}' [{}] -> {}",
            self.id,
            self.spec.media_title,
            self.spec.format.format_id,
            destination.display()
        );

        self.emit_progress(emitter, 0.0, progress::format_eta(0));

        let result = if self.control.is_cancelled() {
            Err(TaskError::CancelledByUser)
        } else {
            self.run_engine(engine, base_config, &destination, emitter)
        };

        let result = match result {
            Ok(()) => locate_output(&destination, &preexisting).ok_or_else(|| TaskError::Filesystem {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("engine finished but {} does not exist", destination.display()),
                ),
            }),
            Err(e) => Err(e),
        };

        self.finish(result, Some(&destination), emitter)
    }

    pub fn outcome(&self) -> TaskOutcome {
        match (&self.transfer.state, &self.final_path, &self.error) {
            (TaskState::Completed, Some(path), _) => TaskOutcome::Completed(path.clone()),
            (TaskState::Cancelled, _, _) => TaskOutcome::Cancelled,
            (_, _, Some(message)) => TaskOutcome::Failed(message.clone()),
            _ => TaskOutcome::Failed(format!("task {} has not finished", self.id)),
        }
    }

    fn prepare_destination(&self, merge_format: &str) -> Result<PathBuf, TaskError> {
        std::fs::create_dir_all(&self.spec.destination_dir)?;

        let file_name = filename::destination_file_name(
            &self.spec.media_title,
            &self.spec.format.resolution_label(),
            self.output_extension(merge_format),
        );
        Ok(filename::unique_destination(&self.spec.destination_dir, &file_name))
    }

    /// Video-only encodings get merged with the best audio, so they end up
    /// in the merge container; everything else keeps its own.
    fn output_extension<'a>(&'a self, merge_format: &'a str) -> &'a str {
        let format = &self.spec.format;
        if format.has_video && !format.has_audio && !merge_format.is_empty() {
            merge_format
        } else {
            &format.container_ext
        }
    }

    fn run_engine<E: EventEmitter>(
        &mut self,
        engine: &dyn Engine,
        base_config: &EngineConfig,
        destination: &Path,
        emitter: &E,
    ) -> Result<(), TaskError> {
        let config = base_config.for_download(&self.spec.format.format_id, destination);
        let request = DownloadRequest {
            url: &self.spec.url,
            format_id: &self.spec.format.format_id,
            output: self.control.output(),
            config: &config,
        };
        let mut hooks = TaskHooks {
            task_id: self.id,
            control: &self.control,
            transfer: &mut self.transfer,
            emitter,
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| engine.download(&request, &mut hooks)));
        match result {
            Ok(Ok(())) if self.control.is_cancelled() => Err(TaskError::CancelledByUser),
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) if self.control.is_cancelled() => Err(TaskError::CancelledByUser),
            Ok(Err(EngineError::Aborted)) => Err(TaskError::CancelledByUser),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(TaskError::Engine(EngineError::Extraction {
                reason: format!("engine '{}' panicked", engine.name()),
            })),
        }
    }

    fn finish<E: EventEmitter>(
        &mut self,
        result: Result<PathBuf, TaskError>,
        destination: Option<&Path>,
        emitter: &E,
    ) -> TaskOutcome {
        self.control.settle();
        if let Some(destination) = destination {
            artifacts::cleanup_artifacts(destination);
            if matches!(result, Err(TaskError::CancelledByUser)) {
                artifacts::discard_destination(destination);
            }
        }

        let event = match result {
            Ok(path) => {
                if !self.transfer.completion_reported {
                    self.emit_progress(emitter, 100.0, COMPLETE_LABEL.to_string());
                }
                tracing::info!("task {} finished: {}", self.id, path.display());
                self.transfer.state = TaskState::Completed;
                self.final_path = Some(path.clone());
                Event::DownloadFinished {
                    task_id: self.id,
                    final_path: path,
                }
            }
            Err(TaskError::CancelledByUser) => {
                tracing::info!("task {} cancelled", self.id);
                self.transfer.state = TaskState::Cancelled;
                Event::DownloadCancelled { task_id: self.id }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!("task {} failed: {}", self.id, message);
                self.transfer.state = TaskState::Failed;
                self.error = Some(message.clone());
                Event::DownloadFailed {
                    task_id: self.id,
                    message,
                }
            }
        };

        if self.terminal_emitted {
            tracing::error!("task {} tried to emit a second terminal event", self.id);
        } else {
            self.terminal_emitted = true;
            emitter.emit(event);
        }
        self.outcome()
    }

    fn emit_progress<E: EventEmitter>(&self, emitter: &E, percent: f64, eta_display: String) {
        emitter.emit(Event::DownloadProgress(DownloadProgress {
            task_id: self.id,
            percent,
            eta_display,
            is_single_stream_format: self.transfer.streams.is_single_stream(),
            is_primary_stream: self.transfer.streams.is_primary(),
        }));
    }
}

struct TaskHooks<'a, E: EventEmitter> {
    task_id: TaskId,
    control: &'a CancelHandle,
    transfer: &'a mut Transfer,
    emitter: &'a E,
}

impl<E: EventEmitter> TaskHooks<'_, E> {
    fn emit(&self, percent: f64, eta_display: String) {
        self.emitter.emit(Event::DownloadProgress(DownloadProgress {
            task_id: self.task_id,
            percent,
            eta_display,
            is_single_stream_format: self.transfer.streams.is_single_stream(),
            is_primary_stream: self.transfer.streams.is_primary(),
        }));
    }
}

impl<E: EventEmitter> EngineHooks for TaskHooks<'_, E> {
    fn on_progress(&mut self, report: &ProgressReport) -> HookFlow {
        if self.control.is_cancelled() {
            return HookFlow::Abort;
        }

        if report.total_bytes.is_some() {
            self.transfer.bytes_total = report.total_bytes;
        }
        self.transfer.bytes_done = report.downloaded_bytes;

        let percent = progress::percent(report.downloaded_bytes, self.transfer.bytes_total);
        if self.transfer.streams.observe(percent) {
            tracing::debug!("task {}: secondary stream started", self.task_id);
        }
        let eta = progress::eta_seconds(
            report.downloaded_bytes,
            self.transfer.bytes_total,
            report.speed,
        );
        self.emit(percent, progress::format_eta(eta));
        HookFlow::Continue
    }

    fn on_postprocess(&mut self, status: PostprocessStatus) -> HookFlow {
        if self.control.is_cancelled() {
            return HookFlow::Abort;
        }

        match status {
            PostprocessStatus::Started => {
                tracing::debug!("task {}: merging", self.task_id);
                self.transfer.state = TaskState::Merging;
                self.emit(99.0, MERGING_LABEL.to_string());
            }
            PostprocessStatus::Finished => {
                self.transfer.completion_reported = true;
                self.emit(100.0, COMPLETE_LABEL.to_string());
            }
        }
        HookFlow::Continue
    }
}

fn same_stem_outputs(destination: &Path) -> Vec<PathBuf> {
    match (destination.parent(), destination.file_stem().and_then(|s| s.to_str())) {
        (Some(dir), Some(stem)) => filename::same_stem_files(dir, stem),
        _ => Vec::new(),
    }
}

/// The engine normally writes exactly `destination`; a container change on
/// merge can leave it under another extension with the same stem. Files in
/// `preexisting` were there before the engine ran and are skipped.
fn locate_output(destination: &Path, preexisting: &[PathBuf]) -> Option<PathBuf> {
    if destination.is_file() {
        return Some(destination.to_path_buf());
    }
    same_stem_outputs(destination)
        .into_iter()
        .find(|path| !preexisting.contains(path))
}
