//! Store trait definition.

use crate::error::StoreResult;
use crate::types::{QueueEntry, SyncConfig, SyncHistoryEntry};
use tasksync_protocol::TaskRecord;

/// Collapses the queued entries of one task into a single entry.
pub type TaskEntryFold = dyn Fn(&[QueueEntry]) -> Option<QueueEntry>;

/// Persistence used by the sync engine.
///
/// All writes to the config and the queue go through this trait; nothing
/// else in the engine holds mutable shared state.
///
/// # Invariants
///
/// - At most one [`SyncConfig`] exists
/// - Queue entries are returned in enqueue order
/// - Every successful write is durable before the call returns
/// - Implementations must be `Send + Sync`
///
/// # Implementors
///
/// - [`super::MemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait SyncStore: Send + Sync {
    /// Loads the sync config, if sync was ever enabled.
    fn load_config(&self) -> StoreResult<Option<SyncConfig>>;

    /// Creates or replaces the sync config.
    fn save_config(&self, config: &SyncConfig) -> StoreResult<()>;

    /// Appends an entry at the tail of the queue.
    fn append_entry(&self, entry: QueueEntry) -> StoreResult<()>;

    /// Returns every queued entry in enqueue order.
    fn queue_entries(&self) -> StoreResult<Vec<QueueEntry>>;

    /// Returns the number of queued entries.
    fn queue_len(&self) -> StoreResult<usize>;

    /// Removes every entry for `task_id`, returning how many were removed.
    fn remove_task_entries(&self, task_id: &str) -> StoreResult<usize>;

    /// Atomically swaps every entry for `task_id` for the one `fold` builds
    /// from them.
    ///
    /// `fold` sees the entries in enqueue order and only runs when there are
    /// at least two. The result takes the queue position of the most recent
    /// removed entry. Returns how many entries were removed; when `fold`
    /// declines, or there was nothing to fold, the queue is left unchanged.
    fn fold_task_entries(&self, task_id: &str, fold: &TaskEntryFold) -> StoreResult<usize>;

    /// Increments `retry_count` on every entry for `task_id`.
    fn increment_retry(&self, task_id: &str) -> StoreResult<usize>;

    /// Drops the whole queue, returning how many entries were removed.
    fn clear_queue(&self) -> StoreResult<usize>;

    /// Loads one task.
    fn get_task(&self, task_id: &str) -> StoreResult<Option<TaskRecord>>;

    /// Inserts or replaces a task.
    fn put_task(&self, task: &TaskRecord) -> StoreResult<()>;

    /// Deletes a task, returning whether it existed.
    fn delete_task(&self, task_id: &str) -> StoreResult<bool>;

    /// Returns every task ordered by ID.
    fn all_tasks(&self) -> StoreResult<Vec<TaskRecord>>;

    /// Appends a history line, keeping at most `capacity` lines.
    fn append_history(&self, entry: SyncHistoryEntry, capacity: usize) -> StoreResult<()>;

    /// Returns up to `limit` history lines, newest first.
    fn history(&self, limit: usize) -> StoreResult<Vec<SyncHistoryEntry>>;

    /// Returns the queued entries for one task, in enqueue order.
    fn entries_for_task(&self, task_id: &str) -> StoreResult<Vec<QueueEntry>> {
        Ok(self
            .queue_entries()?
            .into_iter()
            .filter(|e| e.task_id == task_id)
            .collect())
    }
}
