use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::media::FormatCatalog;

pub type TaskId = u64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    SearchCompleted {
        search_id: TaskId,
        catalog: FormatCatalog,
    },
    SearchFailed {
        search_id: TaskId,
        message: String,
    },
    SearchCancelled {
        search_id: TaskId,
    },
    DownloadProgress(DownloadProgress),
    DownloadFinished {
        task_id: TaskId,
        final_path: PathBuf,
    },
    DownloadFailed {
        task_id: TaskId,
        message: String,
    },
    DownloadCancelled {
        task_id: TaskId,
    },
}

impl Event {
    /// Id of the task or search the event belongs to.
    pub fn source_id(&self) -> TaskId {
        match self {
            Event::SearchCompleted { search_id, .. }
            | Event::SearchFailed { search_id, .. }
            | Event::SearchCancelled { search_id } => *search_id,
            Event::DownloadProgress(p) => p.task_id,
            Event::DownloadFinished { task_id, .. }
            | Event::DownloadFailed { task_id, .. }
            | Event::DownloadCancelled { task_id } => *task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::DownloadProgress(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadProgress {
    pub task_id: TaskId,
    pub percent: f64,
    /// `HH:MM:SS`, `Merging...` or `Complete`.
    pub eta_display: String,
    pub is_single_stream_format: bool,
    pub is_primary_stream: bool,
}

/// Sink for everything the core reports to the presentation layer.
///
/// Implementations must deliver events in the order `emit` is called.
pub trait EventEmitter: Send + Sync + Clone + 'static {
    fn emit(&self, event: Event);
}

/// Emitter backed by an unbounded channel with a single consumer.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventEmitter for ChannelEmitter {
    fn emit(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event receiver dropped; event discarded");
        }
    }
}
