use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::core::engine::{Engine, EngineConfig};
use crate::core::events::{Event, EventEmitter, TaskId};
use crate::core::registry::{RegistryKey, TaskRegistry};
use crate::core::search::SearchTask;
use crate::core::task::{CancelHandle, DownloadSpec, DownloadTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkKind {
    Search,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkStatus {
    Queued,
    Active,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkInfo {
    pub id: TaskId,
    pub kind: WorkKind,
    pub status: WorkStatus,
    pub label: String,
}

struct WorkItem {
    kind: WorkKind,
    status: WorkStatus,
    label: String,
    cancel: CancelHandle,
}

/// Caller's grip on a submitted download.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    key: RegistryKey,
    cancel: CancelHandle,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn key(&self) -> &RegistryKey {
        &self.key
    }

    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug, Clone)]
pub struct SearchHandle {
    id: TaskId,
    cancel: CancelHandle,
}

impl SearchHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }
}

/// Runs searches and downloads on a bounded pool of blocking workers.
///
/// Submissions never block: work past the pool size waits, in submission
/// order, for a free worker. Every unit of work reports through the shared
/// emitter and ends with exactly one terminal event.
///
/// Registry entries are not released here. Whoever consumes a download's
/// terminal event calls [`Dispatcher::release`] with its key.
pub struct Dispatcher<E: EventEmitter> {
    engine: Arc<dyn Engine>,
    config: Arc<EngineConfig>,
    emitter: E,
    registry: Arc<TaskRegistry>,
    workers: Arc<Semaphore>,
    pool_size: usize,
    next_id: AtomicU64,
    items: Arc<Mutex<HashMap<TaskId, WorkItem>>>,
    tracker: TaskTracker,
}

impl<E: EventEmitter> Dispatcher<E> {
    pub fn new(engine: Arc<dyn Engine>, config: EngineConfig, emitter: E, pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        tracing::debug!("dispatcher using engine '{}' with {} worker(s)", engine.name(), pool_size);
        Self {
            engine,
            config: Arc::new(config),
            emitter,
            registry: Arc::new(TaskRegistry::new()),
            workers: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            next_id: AtomicU64::new(1),
            items: Arc::new(Mutex::new(HashMap::new())),
            tracker: TaskTracker::new(),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Queues a download. Returns `None`, and does nothing else, when the
    /// same format of the same media is already live.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_download(&self, spec: DownloadSpec) -> Option<TaskHandle> {
        let id = self.allocate_id();
        let key = RegistryKey::new(spec.media_title.clone(), spec.format.format_id.clone());
        if !self.registry.try_acquire(key.clone(), id) {
            tracing::debug!(
                "duplicate download of '{}' [{}] ignored",
                key.media_title,
                key.format_id
            );
            return None;
        }

        let label = format!("{} [{}]", spec.media_title, spec.format.format_id);
        let mut task = DownloadTask::new(id, spec);
        let cancel = task.cancel_handle();
        self.track(id, WorkKind::Download, label, cancel.clone());

        let engine = self.engine.clone();
        let config = self.config.clone();
        let emitter = self.emitter.clone();
        self.spawn_worker(id, move || {
            task.start(engine.as_ref(), &config, &emitter);
        });

        Some(TaskHandle { id, key, cancel })
    }

    /// Queues a format search for `url`; the result arrives as a
    /// `SearchCompleted`, `SearchFailed` or `SearchCancelled` event.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_search(&self, url: impl Into<String>) -> SearchHandle {
        let id = self.allocate_id();
        let search = SearchTask::new(id, url);
        let cancel = search.cancel_handle();
        self.track(id, WorkKind::Search, search.url().to_string(), cancel.clone());

        let engine = self.engine.clone();
        let config = self.config.clone();
        let emitter = self.emitter.clone();
        self.spawn_worker(id, move || {
            search.run_and_emit(engine.as_ref(), &config, &emitter);
        });

        SearchHandle { id, cancel }
    }

    /// Cancels queued or running work by id. Returns `false` for unknown,
    /// finished or already cancelled ids.
    pub fn cancel(&self, id: TaskId) -> bool {
        let cancel = self.lock_items().get(&id).map(|item| item.cancel.clone());
        match cancel {
            Some(cancel) => cancel.cancel(),
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let handles: Vec<CancelHandle> = self
            .lock_items()
            .values()
            .map(|item| item.cancel.clone())
            .collect();
        handles.iter().filter(|h| h.cancel()).count()
    }

    pub fn release(&self, key: &RegistryKey) -> Option<TaskId> {
        self.registry.release(key)
    }

    /// Work that has not reached a terminal state yet, oldest first.
    pub fn snapshot(&self) -> Vec<WorkInfo> {
        let mut items: Vec<WorkInfo> = self
            .lock_items()
            .iter()
            .map(|(id, item)| WorkInfo {
                id: *id,
                kind: item.kind,
                status: item.status,
                label: item.label.clone(),
            })
            .collect();
        items.sort_by_key(|item| item.id);
        items
    }

    pub fn pending_count(&self) -> usize {
        self.lock_items().len()
    }

    /// Waits until every submitted unit of work has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn allocate_id(&self) -> TaskId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn track(&self, id: TaskId, kind: WorkKind, label: String, cancel: CancelHandle) {
        self.lock_items().insert(
            id,
            WorkItem {
                kind,
                status: WorkStatus::Queued,
                label,
                cancel,
            },
        );
    }

    fn lock_items(&self) -> MutexGuard<'_, HashMap<TaskId, WorkItem>> {
        lock_items(&self.items)
    }

    fn spawn_worker<F>(&self, id: TaskId, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let workers = self.workers.clone();
        let items = self.items.clone();
        let emitter = self.emitter.clone();

        self.tracker.spawn(async move {
            let permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!("worker pool closed; dropping work {}", id);
                    lock_items(&items).remove(&id);
                    return;
                }
            };

            if let Some(item) = lock_items(&items).get_mut(&id) {
                item.status = WorkStatus::Active;
            }

            let joined = tokio::task::spawn_blocking(work).await;
            drop(permit);
            let finished = lock_items(&items).remove(&id);

            if let Err(e) = joined {
                // The unit never reached its own terminal event.
                tracing::error!("worker for {} did not finish: {}", id, e);
                let event = match finished.map(|item| item.kind) {
                    Some(WorkKind::Search) => Event::SearchFailed {
                        search_id: id,
                        message: e.to_string(),
                    },
                    _ => Event::DownloadFailed {
                        task_id: id,
                        message: e.to_string(),
                    },
                };
                emitter.emit(event);
            }
        });
    }
}

fn lock_items(items: &Mutex<HashMap<TaskId, WorkItem>>) -> MutexGuard<'_, HashMap<TaskId, WorkItem>> {
    // Single-operation updates only; a poisoned table is still consistent.
    items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
