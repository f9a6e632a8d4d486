//! The durable outbound queue.

use crate::context::{now_millis, SyncContext};
use crate::error::SyncResult;
use std::collections::BTreeSet;
use std::sync::Arc;
use tasksync_protocol::{OperationType, TaskRecord, VectorClock};
use tasksync_store::{QueueEntry, SyncStore};
use tracing::debug;

/// Ordered log of local mutations awaiting push.
///
/// Entries survive restarts and leave the queue only when the server
/// accepts them, reports a conflict for their task, or consolidation folds
/// them into a newer entry.
#[derive(Clone)]
pub struct SyncQueue {
    store: Arc<dyn SyncStore>,
}

impl SyncQueue {
    /// Creates a queue over the context's store.
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            store: Arc::clone(ctx.store()),
        }
    }

    /// Appends a mutation.
    pub fn enqueue(
        &self,
        operation: OperationType,
        task_id: &str,
        payload: Option<TaskRecord>,
        vector_clock: VectorClock,
    ) -> SyncResult<QueueEntry> {
        let entry = QueueEntry::new(operation, task_id, payload, vector_clock, now_millis());
        self.store.append_entry(entry.clone())?;
        debug!(task_id, operation = %operation, entry_id = %entry.id, "enqueued mutation");
        Ok(entry)
    }

    /// Returns every entry in enqueue order.
    pub fn pending(&self) -> SyncResult<Vec<QueueEntry>> {
        Ok(self.store.queue_entries()?)
    }

    /// Returns the number of queued entries.
    pub fn pending_count(&self) -> SyncResult<usize> {
        Ok(self.store.queue_len()?)
    }

    /// Returns the entries for one task.
    pub fn entries_for_task(&self, task_id: &str) -> SyncResult<Vec<QueueEntry>> {
        Ok(self.store.entries_for_task(task_id)?)
    }

    /// Drops every entry for a task.
    pub fn remove_task(&self, task_id: &str) -> SyncResult<usize> {
        Ok(self.store.remove_task_entries(task_id)?)
    }

    /// Bumps the retry count of every entry for a task.
    pub fn increment_retry(&self, task_id: &str) -> SyncResult<usize> {
        Ok(self.store.increment_retry(task_id)?)
    }

    /// Returns the distinct task IDs with queued entries.
    pub fn queued_task_ids(&self) -> SyncResult<BTreeSet<String>> {
        Ok(self
            .store
            .queue_entries()?
            .into_iter()
            .map(|e| e.task_id)
            .collect())
    }

    /// Drops the whole queue.
    pub fn clear(&self) -> SyncResult<usize> {
        Ok(self.store.clear_queue()?)
    }

    /// Collapses every entry for `task_id` into one.
    ///
    /// Returns how many entries were removed (zero if the task had at most
    /// one entry).
    pub fn consolidate_task(&self, task_id: &str) -> SyncResult<usize> {
        let replaced = self.store.fold_task_entries(task_id, &consolidate_entries)?;
        let removed = replaced.saturating_sub(1);
        if removed == 0 {
            return Ok(0);
        }
        debug!(task_id, removed, "consolidated queue entries");
        Ok(removed)
    }

    /// Consolidates every task in the queue.
    pub fn consolidate_all(&self) -> SyncResult<usize> {
        let mut removed = 0;
        for task_id in self.queued_task_ids()? {
            removed += self.consolidate_task(&task_id)?;
        }
        if removed > 0 {
            debug!(removed, "consolidated queue");
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue").finish_non_exhaustive()
    }
}

/// Folds the entries of one task, given in enqueue order, into one entry.
///
/// - Any delete makes the result a delete with no payload.
/// - Otherwise the newest payload wins, and the operation is `create` when
///   the oldest entry was a create.
/// - Clocks are merged, retry counts take the maximum and
///   `consolidated_from` collects every absorbed ID.
///
/// Returns `None` for an empty slice.
pub fn consolidate_entries(entries: &[QueueEntry]) -> Option<QueueEntry> {
    let first = entries.first()?;
    let last = entries.last()?;

    let vector_clock = entries
        .iter()
        .fold(VectorClock::new(), |acc, e| acc.merged(&e.vector_clock));

    let (operation, payload) = if entries.iter().any(|e| e.operation.is_delete()) {
        (OperationType::Delete, None)
    } else if first.operation == OperationType::Create {
        (OperationType::Create, last.payload.clone())
    } else {
        (OperationType::Update, last.payload.clone())
    };

    let mut absorbed: Vec<String> = Vec::new();
    for entry in entries {
        for id in entry
            .consolidated_from
            .iter()
            .chain(std::iter::once(&entry.id))
        {
            if !absorbed.contains(id) {
                absorbed.push(id.clone());
            }
        }
    }

    let mut merged = QueueEntry::new(
        operation,
        first.task_id.clone(),
        payload,
        vector_clock,
        last.timestamp,
    );
    merged.retry_count = entries.iter().map(|e| e.retry_count).max().unwrap_or(0);
    merged.consolidated_from = absorbed;
    Some(merged)
}
