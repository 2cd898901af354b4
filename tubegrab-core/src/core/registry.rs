use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::core::events::TaskId;

/// Identity of a download: the same encoding of the same media.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub media_title: String,
    pub format_id: String,
}

impl RegistryKey {
    pub fn new(media_title: impl Into<String>, format_id: impl Into<String>) -> Self {
        Self {
            media_title: media_title.into(),
            format_id: format_id.into(),
        }
    }
}

/// In-flight downloads, at most one per [`RegistryKey`].
///
/// Entries are never evicted automatically; whoever handles a task's
/// terminal event releases its key.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    live: Mutex<HashMap<RegistryKey, TaskId>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key` for `task_id`. Returns `false`, changing nothing, when
    /// the key is already live.
    pub fn try_acquire(&self, key: RegistryKey, task_id: TaskId) -> bool {
        let mut live = self.lock();
        if live.contains_key(&key) {
            return false;
        }
        live.insert(key, task_id);
        true
    }

    /// Frees `key`. Releasing an absent key is a no-op, which happens when a
    /// cancel path and a completion path both release.
    pub fn release(&self, key: &RegistryKey) -> Option<TaskId> {
        let removed = self.lock().remove(key);
        if removed.is_none() {
            tracing::debug!(
                "registry release for '{}' [{}] ignored: not live",
                key.media_title,
                key.format_id
            );
        }
        removed
    }

    pub fn owner(&self, key: &RegistryKey) -> Option<TaskId> {
        self.lock().get(key).copied()
    }

    pub fn contains(&self, key: &RegistryKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RegistryKey, TaskId>> {
        // Inserts and removes are single map operations; a poisoned map is still consistent.
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn second_acquire_on_live_key_fails() {
        let registry = TaskRegistry::new();
        let key = RegistryKey::new("Clip", "137");
        assert!(registry.try_acquire(key.clone(), 1));
        assert!(!registry.try_acquire(key.clone(), 2));
        assert_eq!(registry.owner(&key), Some(1));
    }

    #[test]
    fn release_frees_key() {
        let registry = TaskRegistry::new();
        let key = RegistryKey::new("Clip", "137");
        registry.try_acquire(key.clone(), 1);
        assert_eq!(registry.release(&key), Some(1));
        assert!(registry.try_acquire(key, 2));
    }

    #[test]
    fn double_release_is_noop() {
        let registry = TaskRegistry::new();
        let key = RegistryKey::new("Clip", "137");
        registry.try_acquire(key.clone(), 1);
        registry.release(&key);
        assert_eq!(registry.release(&key), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn distinct_formats_do_not_collide() {
        let registry = TaskRegistry::new();
        assert!(registry.try_acquire(RegistryKey::new("Clip", "137"), 1));
        assert!(registry.try_acquire(RegistryKey::new("Clip", "140"), 2));
        assert!(registry.try_acquire(RegistryKey::new("Other", "137"), 3));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn concurrent_acquire_has_single_winner() {
        let registry = Arc::new(TaskRegistry::new());
        let wins = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..16)
            .map(|id| {
                let registry = registry.clone();
                let wins = wins.clone();
                std::thread::spawn(move || {
                    if registry.try_acquire(RegistryKey::new("Clip", "22"), id) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }
}
