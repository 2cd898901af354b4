use std::panic::{self, AssertUnwindSafe};

use crate::core::catalog::build_catalog;
use crate::core::engine::{Engine, EngineConfig};
use crate::core::events::{Event, EventEmitter, TaskId};
use crate::core::task::CancelHandle;
use crate::error::SearchError;
use crate::models::media::FormatCatalog;

/// Resolves a URL into a [`FormatCatalog`].
///
/// Cancellation cannot interrupt the blocking extraction; a search
/// cancelled mid-flight discards its result when the engine returns.
pub struct SearchTask {
    id: TaskId,
    url: String,
    control: CancelHandle,
}

impl SearchTask {
    pub fn new(id: TaskId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            control: CancelHandle::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.control.clone()
    }

    pub fn run(&self, engine: &dyn Engine, config: &EngineConfig) -> Result<FormatCatalog, SearchError> {
        if self.control.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        validate_url(&self.url)?;

        tracing::info!("search {}: resolving {}", self.id, self.url);
        let extracted = panic::catch_unwind(AssertUnwindSafe(|| engine.extract(&self.url, config)))
            .map_err(|_| SearchError::Extraction {
                reason: format!("engine '{}' panicked", engine.name()),
            })?;

        if self.control.is_cancelled() {
            tracing::debug!("search {}: result discarded after cancel", self.id);
            return Err(SearchError::Cancelled);
        }

        let info = extracted?;
        let catalog = build_catalog(&info, &self.url);
        if catalog.is_empty() {
            return Err(SearchError::Extraction {
                reason: "no downloadable formats".to_string(),
            });
        }
        Ok(catalog)
    }

    /// Runs the search and reports the result as exactly one terminal event.
    pub fn run_and_emit<E: EventEmitter>(&self, engine: &dyn Engine, config: &EngineConfig, emitter: &E) {
        let event = match self.run(engine, config) {
            Ok(catalog) => {
                tracing::info!(
                    "search {}: {} format(s) for '{}'",
                    self.id,
                    catalog.len(),
                    catalog.metadata().title
                );
                Event::SearchCompleted {
                    search_id: self.id,
                    catalog,
                }
            }
            Err(SearchError::Cancelled) => {
                tracing::info!("search {} cancelled", self.id);
                Event::SearchCancelled { search_id: self.id }
            }
            Err(e) => {
                tracing::warn!("search {} failed: {}", self.id, e);
                Event::SearchFailed {
                    search_id: self.id,
                    message: e.to_string(),
                }
            }
        };
        self.control.settle();
        emitter.emit(event);
    }
}

fn validate_url(raw: &str) -> Result<(), SearchError> {
    let unsupported = || SearchError::UnsupportedUrl {
        url: raw.to_string(),
    };
    let parsed = url::Url::parse(raw.trim()).map_err(|_| unsupported())?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        _ => Err(unsupported()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{raw_format, RecordingEmitter, ScriptedEngine};
    use crate::error::EngineError;
    use crate::models::media::MediaInfo;
    use std::sync::Arc;

    fn info() -> MediaInfo {
        MediaInfo {
            title: Some("Clip".into()),
            formats: vec![
                raw_format("137", "mp4", Some(1080), "avc1", "none"),
                raw_format("140", "m4a", None, "none", "mp4a"),
            ],
            ..MediaInfo::default()
        }
    }

    #[test]
    fn resolves_catalog() {
        let engine = ScriptedEngine::with_info(info());
        let search = SearchTask::new(1, "https://example.com/watch?v=1");
        let catalog = search.run(&engine, &EngineConfig::default()).unwrap();
        assert_eq!(catalog.metadata().title, "Clip");
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn rejects_non_http_url_without_calling_engine() {
        let engine = ScriptedEngine::with_info(info());
        let search = SearchTask::new(1, "ftp://example.com/clip");
        assert!(matches!(
            search.run(&engine, &EngineConfig::default()),
            Err(SearchError::UnsupportedUrl { .. })
        ));
        assert!(matches!(
            SearchTask::new(2, "not a url").run(&engine, &EngineConfig::default()),
            Err(SearchError::UnsupportedUrl { .. })
        ));
        assert_eq!(engine.extracts.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn engine_error_is_classified() {
        let engine = ScriptedEngine::failing_extract(EngineError::Timeout {
            reason: "read timed out".into(),
        });
        let search = SearchTask::new(1, "https://example.com/watch?v=1");
        assert!(matches!(
            search.run(&engine, &EngineConfig::default()),
            Err(SearchError::Timeout { .. })
        ));
    }

    #[test]
    fn empty_catalog_is_an_extraction_error() {
        let engine = ScriptedEngine::with_info(MediaInfo::default());
        let search = SearchTask::new(1, "https://example.com/watch?v=1");
        assert!(matches!(
            search.run(&engine, &EngineConfig::default()),
            Err(SearchError::Extraction { .. })
        ));
    }

    #[test]
    fn cancel_during_extraction_discards_result() {
        let search = SearchTask::new(4, "https://example.com/watch?v=1");
        let handle = search.cancel_handle();
        let engine = ScriptedEngine::with_info(info()).before_extract(Arc::new(move || {
            handle.cancel();
        }));
        let emitter = RecordingEmitter::default();

        search.run_and_emit(&engine, &EngineConfig::default(), &emitter);

        assert_eq!(emitter.events(), vec![Event::SearchCancelled { search_id: 4 }]);
    }

    #[test]
    fn failure_emits_search_failed() {
        let engine = ScriptedEngine::failing_extract(EngineError::Extraction {
            reason: "Private video".into(),
        });
        let emitter = RecordingEmitter::default();
        SearchTask::new(5, "https://example.com/watch?v=1").run_and_emit(
            &engine,
            &EngineConfig::default(),
            &emitter,
        );
        let events = emitter.events();
        let [Event::SearchFailed { search_id: 5, message }] = events.as_slice() else {
            panic!("unexpected events {events:?}");
        };
        assert!(message.contains("Private video"));
    }
}
