//! In-memory document shared by the store backends.

use crate::backend::TaskEntryFold;
use crate::types::{QueueEntry, SyncConfig, SyncHistoryEntry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tasksync_protocol::TaskRecord;

/// Current on-disk format version.
pub(crate) const FORMAT_VERSION: u32 = 1;

/// Everything a store persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoreState {
    pub format_version: u32,
    #[serde(default)]
    pub config: Option<SyncConfig>,
    #[serde(default)]
    pub queue: Vec<QueueEntry>,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskRecord>,
    #[serde(default)]
    pub history: VecDeque<SyncHistoryEntry>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            config: None,
            queue: Vec::new(),
            tasks: BTreeMap::new(),
            history: VecDeque::new(),
        }
    }
}

impl StoreState {
    pub fn remove_task_entries(&mut self, task_id: &str) -> usize {
        let before = self.queue.len();
        self.queue.retain(|e| e.task_id != task_id);
        before - self.queue.len()
    }

    pub fn replace_task_entries(&mut self, task_id: &str, replacement: QueueEntry) -> usize {
        let Some(last) = self.queue.iter().rposition(|e| e.task_id == task_id) else {
            return 0;
        };
        let removed = self.remove_task_entries(task_id);
        // Everything before `last` that belonged to the task is gone too.
        let slot = last + 1 - removed;
        self.queue.insert(slot, replacement);
        removed
    }

    pub fn fold_task_entries(&mut self, task_id: &str, fold: &TaskEntryFold) -> usize {
        let entries: Vec<QueueEntry> = self
            .queue
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect();
        if entries.len() < 2 {
            return 0;
        }
        match fold(&entries) {
            Some(merged) => self.replace_task_entries(task_id, merged),
            None => 0,
        }
    }

    pub fn increment_retry(&mut self, task_id: &str) -> usize {
        let mut touched = 0;
        for entry in self.queue.iter_mut().filter(|e| e.task_id == task_id) {
            entry.retry_count = entry.retry_count.saturating_add(1);
            touched += 1;
        }
        touched
    }

    pub fn append_history(&mut self, entry: SyncHistoryEntry, capacity: usize) {
        self.history.push_back(entry);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }

    pub fn history(&self, limit: usize) -> Vec<SyncHistoryEntry> {
        self.history.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksync_protocol::{OperationType, VectorClock};

    fn entry(task_id: &str) -> QueueEntry {
        QueueEntry::new(OperationType::Update, task_id, None, VectorClock::new(), 0)
    }

    #[test]
    fn replacement_takes_last_slot() {
        let mut state = StoreState::default();
        let ids: Vec<_> = ["a", "b", "a", "c", "a", "d"]
            .iter()
            .map(|t| {
                let e = entry(t);
                let id = e.id.clone();
                state.queue.push(e);
                id
            })
            .collect();

        let replacement = entry("a");
        let replacement_id = replacement.id.clone();
        assert_eq!(state.replace_task_entries("a", replacement), 3);

        let order: Vec<_> = state.queue.iter().map(|e| e.id.clone()).collect();
        assert_eq!(order, vec![ids[1].clone(), ids[3].clone(), replacement_id, ids[5].clone()]);
    }

    #[test]
    fn replacing_unknown_task_is_noop() {
        let mut state = StoreState::default();
        state.queue.push(entry("a"));
        assert_eq!(state.replace_task_entries("zzz", entry("zzz")), 0);
        assert_eq!(state.queue.len(), 1);
    }

    #[test]
    fn fold_sees_only_the_task_and_needs_two_entries() {
        let mut state = StoreState::default();
        for task in ["a", "b", "a"] {
            state.queue.push(entry(task));
        }
        state.queue.push(entry("c"));

        let decline = |_: &[QueueEntry]| -> Option<QueueEntry> { None };
        assert_eq!(state.fold_task_entries("a", &decline), 0);
        assert_eq!(state.queue.len(), 4);

        let folded = |entries: &[QueueEntry]| {
            assert!(entries.len() >= 2);
            assert!(entries.iter().all(|e| e.task_id == "a"));
            Some(entries[entries.len() - 1].clone())
        };
        assert_eq!(state.fold_task_entries("a", &folded), 2);
        assert_eq!(state.fold_task_entries("c", &folded), 0);
        assert_eq!(state.queue.len(), 3);
    }

    #[test]
    fn history_is_bounded() {
        let mut state = StoreState::default();
        for i in 0..5 {
            state.append_history(
                SyncHistoryEntry {
                    timestamp: i,
                    status: crate::CycleStatus::Success,
                    priority: crate::SyncPriority::Auto,
                    pushed_count: 0,
                    pulled_count: 0,
                    conflict_count: 0,
                    duration_ms: 0,
                    message: None,
                },
                3,
            );
        }
        let newest_first: Vec<_> = state.history(10).iter().map(|h| h.timestamp).collect();
        assert_eq!(newest_first, vec![4, 3, 2]);
    }
}
