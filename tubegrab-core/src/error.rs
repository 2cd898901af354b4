use std::io;
use std::path::PathBuf;

/// Failure reported by an [`Engine`](crate::core::engine::Engine) call.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("network error: {reason}")]
    Network { reason: String },

    #[error("extraction failed: {reason}")]
    Extraction { reason: String },

    #[error("unsupported URL `{url}`")]
    UnsupportedUrl { url: String },

    #[error("operation timed out: {reason}")]
    Timeout { reason: String },

    #[error("filesystem error: {source}")]
    Filesystem {
        #[from]
        source: io::Error,
    },

    #[error("failed to start engine: {reason}")]
    Spawn { reason: String },

    #[error("engine call aborted by hook")]
    Aborted,
}

/// Outcome of a failed or cancelled format-resolution request.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("network error: {reason}")]
    Network { reason: String },

    #[error("extraction failed: {reason}")]
    Extraction { reason: String },

    #[error("unsupported URL `{url}`")]
    UnsupportedUrl { url: String },

    #[error("search timed out: {reason}")]
    Timeout { reason: String },

    #[error("search cancelled")]
    Cancelled,
}

impl From<EngineError> for SearchError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Network { reason } => SearchError::Network { reason },
            EngineError::Extraction { reason } => SearchError::Extraction { reason },
            EngineError::UnsupportedUrl { url } => SearchError::UnsupportedUrl { url },
            EngineError::Timeout { reason } => SearchError::Timeout { reason },
            EngineError::Aborted => SearchError::Cancelled,
            EngineError::Filesystem { source } => SearchError::Extraction {
                reason: source.to_string(),
            },
            EngineError::Spawn { reason } => SearchError::Extraction { reason },
        }
    }
}

/// Why a download task did not complete.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("network error: {reason}")]
    Network { reason: String },

    #[error("extraction failed: {reason}")]
    Extraction { reason: String },

    #[error("filesystem error: {source}")]
    Filesystem {
        #[from]
        source: io::Error,
    },

    #[error("cancelled by user")]
    CancelledByUser,

    #[error("{0}")]
    Engine(EngineError),
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::CancelledByUser)
    }
}

impl From<EngineError> for TaskError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Network { reason } => TaskError::Network { reason },
            EngineError::Extraction { reason } => TaskError::Extraction { reason },
            EngineError::Filesystem { source } => TaskError::Filesystem { source },
            EngineError::Aborted => TaskError::CancelledByUser,
            other => TaskError::Engine(other),
        }
    }
}

/// A leftover artifact that could not be removed. Only ever logged.
#[derive(Debug, thiserror::Error)]
#[error("failed to remove {}: {source}", path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// A required external tool could not be found or run.
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("{tool} not found (looked in the configured location, {} and PATH)", searched.display())]
    Missing { tool: String, searched: PathBuf },

    #[error("{tool} at {} does not run: {reason}", path.display())]
    Broken {
        tool: String,
        path: PathBuf,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_engine_call_maps_to_cancelled() {
        assert!(TaskError::from(EngineError::Aborted).is_cancelled());
        assert!(matches!(
            SearchError::from(EngineError::Aborted),
            SearchError::Cancelled
        ));
    }

    #[test]
    fn network_error_keeps_reason() {
        let err = TaskError::from(EngineError::Network {
            reason: "connection reset".into(),
        });
        assert_eq!(err.to_string(), "network error: connection reset");
    }

    #[test]
    fn timeout_passes_through_as_engine_error() {
        let err = TaskError::from(EngineError::Timeout {
            reason: "read".into(),
        });
        assert!(matches!(err, TaskError::Engine(EngineError::Timeout { .. })));
    }

    #[test]
    fn cleanup_error_names_path() {
        let err = CleanupError {
            path: PathBuf::from("video.mp4.part"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().starts_with("failed to remove video.mp4.part"));
    }
}
