//! Persisted record types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tasksync_protocol::{ConflictStrategy, OperationType, TaskRecord, VectorClock};

/// The per-installation sync configuration.
///
/// Exactly one exists once sync has been enabled. All timestamps are Unix
/// epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// This device's ID.
    pub device_id: String,
    /// Whether sync is switched on.
    pub enabled: bool,
    /// Bearer token for the sync service.
    #[serde(default)]
    pub token: Option<String>,
    /// Token expiry (ms).
    #[serde(default)]
    pub token_expires_at: Option<i64>,
    /// Causal state merged from every completed cycle.
    #[serde(default)]
    pub vector_clock: VectorClock,
    /// Start time of the last successful cycle (ms).
    #[serde(default)]
    pub last_sync_at: Option<i64>,
    /// Transient failures since the last success.
    #[serde(default)]
    pub consecutive_failures: u32,
    /// Time of the last transient failure (ms).
    #[serde(default)]
    pub last_failure_at: Option<i64>,
    /// Message of the last transient failure.
    #[serde(default)]
    pub last_failure_reason: Option<String>,
    /// Earliest time an automatic retry may run (ms).
    #[serde(default)]
    pub next_retry_at: Option<i64>,
    /// How pull resolves concurrent edits.
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
    /// Latest clock of each task changed while sync was switched off.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changed_while_disabled: BTreeMap<String, VectorClock>,
}

impl SyncConfig {
    /// Creates a disabled configuration for a device.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            enabled: false,
            token: None,
            token_expires_at: None,
            vector_clock: VectorClock::new(),
            last_sync_at: None,
            consecutive_failures: 0,
            last_failure_at: None,
            last_failure_reason: None,
            next_retry_at: None,
            conflict_strategy: ConflictStrategy::default(),
            changed_while_disabled: BTreeMap::new(),
        }
    }
}

/// A pending local mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Entry ID.
    pub id: String,
    /// Target task.
    pub task_id: String,
    /// Mutation kind.
    pub operation: OperationType,
    /// Task snapshot (`None` for deletes).
    #[serde(default)]
    pub payload: Option<TaskRecord>,
    /// Task clock at enqueue time.
    #[serde(default)]
    pub vector_clock: VectorClock,
    /// Enqueue time (ms).
    pub timestamp: i64,
    /// Number of server rejections so far.
    #[serde(default)]
    pub retry_count: u32,
    /// IDs of entries folded into this one by consolidation.
    #[serde(default)]
    pub consolidated_from: Vec<String>,
}

impl QueueEntry {
    /// Creates a fresh entry with a random ID.
    pub fn new(
        operation: OperationType,
        task_id: impl Into<String>,
        payload: Option<TaskRecord>,
        vector_clock: VectorClock,
        timestamp: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            operation,
            payload,
            vector_clock,
            timestamp,
            retry_count: 0,
            consolidated_from: Vec::new(),
        }
    }
}

/// Who asked for a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPriority {
    /// Explicit user action; bypasses backoff.
    User,
    /// Timer or event driven.
    Auto,
}

impl SyncPriority {
    /// Combines a pending request with a new one; `User` always wins.
    #[must_use]
    pub fn upgrade(self, other: SyncPriority) -> SyncPriority {
        if self == SyncPriority::User || other == SyncPriority::User {
            SyncPriority::User
        } else {
            SyncPriority::Auto
        }
    }
}

impl fmt::Display for SyncPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPriority::User => f.write_str("user"),
            SyncPriority::Auto => f.write_str("auto"),
        }
    }
}

/// Outcome class of one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    /// Push and pull completed without conflicts.
    Success,
    /// The cycle failed or was skipped.
    Error,
    /// The cycle completed and surfaced conflicts.
    Conflict,
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStatus::Success => f.write_str("success"),
            CycleStatus::Error => f.write_str("error"),
            CycleStatus::Conflict => f.write_str("conflict"),
        }
    }
}

/// One line of the sync observability log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncHistoryEntry {
    /// When the cycle finished (ms).
    pub timestamp: i64,
    /// Outcome.
    pub status: CycleStatus,
    /// Requested priority.
    pub priority: SyncPriority,
    /// Tasks accepted by the server.
    pub pushed_count: u32,
    /// Tasks received from the server.
    pub pulled_count: u32,
    /// Conflicts surfaced.
    pub conflict_count: u32,
    /// Wall time of the cycle.
    pub duration_ms: u64,
    /// Error or summary message.
    #[serde(default)]
    pub message: Option<String>,
}
