//! In-memory store for testing.

use crate::backend::{SyncStore, TaskEntryFold};
use crate::error::StoreResult;
use crate::state::StoreState;
use crate::types::{QueueEntry, SyncConfig, SyncHistoryEntry};
use parking_lot::RwLock;
use tasksync_protocol::TaskRecord;

/// An in-memory store.
///
/// This store keeps everything in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Installations that never persist sync state
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds a config.
    #[must_use]
    pub fn with_config(config: SyncConfig) -> Self {
        let store = Self::new();
        store.state.write().config = Some(config);
        store
    }
}

impl SyncStore for MemoryStore {
    fn load_config(&self) -> StoreResult<Option<SyncConfig>> {
        Ok(self.state.read().config.clone())
    }

    fn save_config(&self, config: &SyncConfig) -> StoreResult<()> {
        self.state.write().config = Some(config.clone());
        Ok(())
    }

    fn append_entry(&self, entry: QueueEntry) -> StoreResult<()> {
        self.state.write().queue.push(entry);
        Ok(())
    }

    fn queue_entries(&self) -> StoreResult<Vec<QueueEntry>> {
        Ok(self.state.read().queue.clone())
    }

    fn queue_len(&self) -> StoreResult<usize> {
        Ok(self.state.read().queue.len())
    }

    fn remove_task_entries(&self, task_id: &str) -> StoreResult<usize> {
        Ok(self.state.write().remove_task_entries(task_id))
    }

    fn fold_task_entries(&self, task_id: &str, fold: &TaskEntryFold) -> StoreResult<usize> {
        Ok(self.state.write().fold_task_entries(task_id, fold))
    }

    fn increment_retry(&self, task_id: &str) -> StoreResult<usize> {
        Ok(self.state.write().increment_retry(task_id))
    }

    fn clear_queue(&self) -> StoreResult<usize> {
        let mut state = self.state.write();
        let removed = state.queue.len();
        state.queue.clear();
        Ok(removed)
    }

    fn get_task(&self, task_id: &str) -> StoreResult<Option<TaskRecord>> {
        Ok(self.state.read().tasks.get(task_id).cloned())
    }

    fn put_task(&self, task: &TaskRecord) -> StoreResult<()> {
        self.state
            .write()
            .tasks
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn delete_task(&self, task_id: &str) -> StoreResult<bool> {
        Ok(self.state.write().tasks.remove(task_id).is_some())
    }

    fn all_tasks(&self) -> StoreResult<Vec<TaskRecord>> {
        Ok(self.state.read().tasks.values().cloned().collect())
    }

    fn append_history(&self, entry: SyncHistoryEntry, capacity: usize) -> StoreResult<()> {
        self.state.write().append_history(entry, capacity);
        Ok(())
    }

    fn history(&self, limit: usize) -> StoreResult<Vec<SyncHistoryEntry>> {
        Ok(self.state.read().history(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tasksync_protocol::{OperationType, VectorClock};

    #[test]
    fn config_singleton() {
        let store = MemoryStore::new();
        assert!(store.load_config().unwrap().is_none());

        let mut config = SyncConfig::new("dev-a");
        store.save_config(&config).unwrap();
        config.enabled = true;
        store.save_config(&config).unwrap();

        let loaded = store.load_config().unwrap().unwrap();
        assert!(loaded.enabled);
    }

    #[test]
    fn queue_operations() {
        let store = MemoryStore::new();
        for task in ["t1", "t2", "t1"] {
            store
                .append_entry(QueueEntry::new(
                    OperationType::Update,
                    task,
                    None,
                    VectorClock::new(),
                    0,
                ))
                .unwrap();
        }

        assert_eq!(store.entries_for_task("t1").unwrap().len(), 2);
        assert_eq!(store.increment_retry("t1").unwrap(), 2);
        assert!(store
            .entries_for_task("t1")
            .unwrap()
            .iter()
            .all(|e| e.retry_count == 1));

        assert_eq!(store.remove_task_entries("t1").unwrap(), 2);
        assert_eq!(store.queue_len().unwrap(), 1);
        assert_eq!(store.clear_queue().unwrap(), 1);
        assert_eq!(store.queue_len().unwrap(), 0);
    }

    #[test]
    fn task_crud() {
        let store = MemoryStore::new();
        let task = TaskRecord::new("t1", "Buy milk", Utc::now());
        store.put_task(&task).unwrap();
        assert_eq!(store.get_task("t1").unwrap(), Some(task));
        assert!(store.delete_task("t1").unwrap());
        assert!(!store.delete_task("t1").unwrap());
        assert!(store.all_tasks().unwrap().is_empty());
    }
}
