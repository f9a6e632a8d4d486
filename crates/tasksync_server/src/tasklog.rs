//! Server-side task state.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use tasksync_protocol::{
    ClockOrdering, Conflict, OperationType, PushOperation, RejectedOperation, RemoteTask,
    VectorClock,
};
use tracing::debug;

/// One page of changes returned to a pulling device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangePage {
    /// Live tasks, oldest first.
    pub tasks: Vec<StoredTask>,
    /// Deleted task IDs.
    pub deleted: Vec<String>,
    /// Tasks remain past the last one in `tasks`.
    pub has_more: bool,
}

/// Latest accepted version of a task.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTask {
    /// Task ID.
    pub id: String,
    /// Base64 ciphertext, opaque to the server.
    pub encrypted_blob: String,
    /// Base64 nonce.
    pub nonce: String,
    /// Client-supplied checksum of the plaintext.
    pub checksum: Option<String>,
    /// Clock the version was pushed with.
    pub vector_clock: VectorClock,
    /// When the server accepted the version.
    pub updated_at: DateTime<Utc>,
    /// Device that pushed it.
    pub origin_device: String,
}

impl StoredTask {
    /// Returns the wire form handed out by pulls.
    pub fn to_remote(&self) -> RemoteTask {
        RemoteTask {
            id: self.id.clone(),
            encrypted_blob: self.encrypted_blob.clone(),
            nonce: self.nonce.clone(),
            vector_clock: self.vector_clock.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Marker left by an accepted delete.
#[derive(Debug, Clone, PartialEq)]
pub struct Tombstone {
    /// Task ID.
    pub task_id: String,
    /// Clock of the delete.
    pub vector_clock: VectorClock,
    /// When the server accepted the delete.
    pub deleted_at: DateTime<Utc>,
    /// Device that deleted the task.
    pub origin_device: String,
}

/// What happened to one pushed operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Stored.
    Accepted,
    /// Refused without touching state.
    Rejected(RejectedOperation),
    /// The stored version is newer or concurrent.
    Conflict(Conflict),
}

#[derive(Debug, Default)]
struct LogState {
    tasks: HashMap<String, StoredTask>,
    tombstones: HashMap<String, Tombstone>,
    server_clock: VectorClock,
}

/// In-memory record of every task the server knows about.
///
/// The log keeps:
/// - The latest accepted version of each live task
/// - A tombstone for each deleted task
/// - A server-wide clock, the merge of every accepted clock
#[derive(Debug, Default)]
pub struct TaskLog {
    state: RwLock<LogState>,
}

impl TaskLog {
    /// Creates a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the server-wide clock.
    pub fn server_clock(&self) -> VectorClock {
        self.state.read().server_clock.clone()
    }

    /// Returns the number of live tasks.
    pub fn len(&self) -> usize {
        self.state.read().tasks.len()
    }

    /// Returns true if no live tasks are stored.
    pub fn is_empty(&self) -> bool {
        self.state.read().tasks.is_empty()
    }

    /// Returns the stored version of a task.
    pub fn get(&self, task_id: &str) -> Option<StoredTask> {
        self.state.read().tasks.get(task_id).cloned()
    }

    /// Returns the tombstone of a deleted task.
    pub fn tombstone(&self, task_id: &str) -> Option<Tombstone> {
        self.state.read().tombstones.get(task_id).cloned()
    }

    /// Applies one pushed operation from `device_id`.
    ///
    /// The operation wins when there is nothing stored for the task or its
    /// clock is after or equal to the stored one (live or tombstone).
    pub fn apply(&self, device_id: &str, op: &PushOperation, now: DateTime<Utc>) -> ApplyOutcome {
        let payload = match op.op_type {
            OperationType::Delete => None,
            _ => match (&op.encrypted_blob, &op.nonce) {
                (Some(blob), Some(nonce)) => Some((blob.clone(), nonce.clone())),
                _ => {
                    return ApplyOutcome::Rejected(RejectedOperation {
                        task_id: op.task_id.clone(),
                        reason: "validation".into(),
                        details: Some(format!("{} without encrypted blob", op.op_type)),
                    })
                }
            },
        };

        let mut state = self.state.write();

        let stored = state.tasks.get(&op.task_id);
        let stored_clock = stored
            .map(|t| &t.vector_clock)
            .or_else(|| state.tombstones.get(&op.task_id).map(|t| &t.vector_clock));
        if let Some(stored_clock) = stored_clock {
            let ordering = op.vector_clock.compare(stored_clock);
            if matches!(ordering, ClockOrdering::Before | ClockOrdering::Concurrent) {
                debug!(task_id = %op.task_id, ?ordering, "push conflicts with stored version");
                return ApplyOutcome::Conflict(Conflict {
                    task_id: op.task_id.clone(),
                    local: payload.as_ref().map(|(blob, nonce)| {
                        json!({ "encryptedBlob": blob, "nonce": nonce })
                    }),
                    remote: stored.map(|t| {
                        json!({
                            "encryptedBlob": t.encrypted_blob,
                            "nonce": t.nonce,
                            "updatedAt": t.updated_at,
                        })
                    }),
                    local_clock: op.vector_clock.clone(),
                    remote_clock: stored_clock.clone(),
                });
            }
        }

        match payload {
            Some((encrypted_blob, nonce)) => {
                state.tombstones.remove(&op.task_id);
                state.tasks.insert(
                    op.task_id.clone(),
                    StoredTask {
                        id: op.task_id.clone(),
                        encrypted_blob,
                        nonce,
                        checksum: op.checksum.clone(),
                        vector_clock: op.vector_clock.clone(),
                        updated_at: now,
                        origin_device: device_id.to_string(),
                    },
                );
            }
            None => {
                state.tasks.remove(&op.task_id);
                state.tombstones.insert(
                    op.task_id.clone(),
                    Tombstone {
                        task_id: op.task_id.clone(),
                        vector_clock: op.vector_clock.clone(),
                        deleted_at: now,
                        origin_device: device_id.to_string(),
                    },
                );
            }
        }
        state.server_clock.merge(&op.vector_clock);
        ApplyOutcome::Accepted
    }

    /// Returns changes made by devices other than `device_id`.
    ///
    /// Live tasks are ordered by acceptance millisecond, then ID, and capped
    /// at `limit`; deleted IDs are not capped. `since` is inclusive (Unix
    /// millis). `after_id` skips tasks at exactly `since` whose ID does not
    /// sort after it, so a truncated page can be resumed from its last task.
    pub fn changes_since(
        &self,
        device_id: &str,
        since: Option<i64>,
        after_id: Option<&str>,
        limit: usize,
    ) -> ChangePage {
        let state = self.state.read();
        let past_cursor = |t: &StoredTask| {
            let Some(since) = since else { return true };
            let at = t.updated_at.timestamp_millis();
            at > since || (at == since && after_id.map_or(true, |after| t.id.as_str() > after))
        };

        let mut tasks: Vec<StoredTask> = state
            .tasks
            .values()
            .filter(|t| t.origin_device != device_id && past_cursor(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            a.updated_at
                .timestamp_millis()
                .cmp(&b.updated_at.timestamp_millis())
                .then_with(|| a.id.cmp(&b.id))
        });
        let has_more = tasks.len() > limit;
        tasks.truncate(limit);

        let mut deleted: Vec<String> = state
            .tombstones
            .values()
            .filter(|t| {
                t.origin_device != device_id
                    && since.map_or(true, |since| t.deleted_at.timestamp_millis() >= since)
            })
            .map(|t| t.task_id.clone())
            .collect();
        deleted.sort();

        ChangePage {
            tasks,
            deleted,
            has_more,
        }
    }
}
