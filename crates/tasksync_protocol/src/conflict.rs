//! Conflict detection and resolution.

use crate::clock::{ClockOrdering, VectorClock};
use crate::task::TaskRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A conflict between a local and a remote version of one task.
///
/// Conflicts are ephemeral: they are surfaced in a cycle result and logged,
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Task ID.
    pub task_id: String,
    /// Local version, if known.
    #[serde(default)]
    pub local: Option<Value>,
    /// Remote version, if known.
    #[serde(default)]
    pub remote: Option<Value>,
    /// Clock of the local version.
    #[serde(default)]
    pub local_clock: VectorClock,
    /// Clock of the remote version.
    #[serde(default)]
    pub remote_clock: VectorClock,
}

impl Conflict {
    /// Creates a conflict from two task versions.
    pub fn between(local: &TaskRecord, remote: &TaskRecord, remote_clock: &VectorClock) -> Self {
        Self {
            task_id: local.id.clone(),
            local: Some(local.to_value()),
            remote: Some(remote.to_value()),
            local_clock: local.vector_clock.clone(),
            remote_clock: remote_clock.clone(),
        }
    }

    /// Returns true if the remote side deleted the task.
    pub fn is_update_delete_conflict(&self) -> bool {
        self.local.is_some() != self.remote.is_some()
    }
}

/// Outcome of comparing a local and a remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Replace the local record with the remote one.
    AcceptRemote,
    /// Keep the local record.
    KeepLocal,
    /// Leave both untouched and surface a [`Conflict`].
    Surface,
}

/// Policy for resolving a remote record against an existing local one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Later `updatedAt` wins; ties go to the remote record.
    #[default]
    LastWriteWins,
    /// Causally concurrent edits are surfaced instead of resolved.
    Manual,
}

impl ConflictStrategy {
    /// Decides what to do with `remote` given the current `local` record.
    ///
    /// `remote_clock` is the clock the server attached to the remote
    /// version. Under [`ConflictStrategy::Manual`] only genuinely concurrent
    /// clocks are surfaced; causally ordered edits still resolve by
    /// timestamp.
    pub fn resolve(
        &self,
        local: &TaskRecord,
        remote: &TaskRecord,
        remote_clock: &VectorClock,
    ) -> Resolution {
        if *self == ConflictStrategy::Manual
            && local.vector_clock.compare(remote_clock) == ClockOrdering::Concurrent
        {
            return Resolution::Surface;
        }

        if remote.updated_at >= local.updated_at {
            Resolution::AcceptRemote
        } else {
            Resolution::KeepLocal
        }
    }

    /// Returns the persisted name of this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::LastWriteWins => "last_write_wins",
            ConflictStrategy::Manual => "manual",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn t0() -> DateTime<Utc> {
        "2025-03-01T08:00:00Z".parse().unwrap()
    }

    fn task(title: &str, updated: DateTime<Utc>, clock: &[(&str, u64)]) -> TaskRecord {
        let mut t = TaskRecord::new("t1", title, t0());
        t.updated_at = updated;
        t.vector_clock = clock.iter().map(|&(d, c)| (d, c)).collect();
        t
    }

    #[test]
    fn lww_newer_remote_wins() {
        let local = task("Local", t0(), &[("a", 1)]);
        let remote = task("Remote", t0() + Duration::milliseconds(5000), &[("b", 1)]);
        assert_eq!(
            ConflictStrategy::LastWriteWins.resolve(&local, &remote, &remote.vector_clock),
            Resolution::AcceptRemote
        );
    }

    #[test]
    fn lww_tie_goes_to_remote() {
        let local = task("Local", t0(), &[("a", 1)]);
        let remote = task("Remote", t0(), &[("b", 1)]);
        assert_eq!(
            ConflictStrategy::LastWriteWins.resolve(&local, &remote, &remote.vector_clock),
            Resolution::AcceptRemote
        );
    }

    #[test]
    fn lww_older_remote_loses() {
        let local = task("Local", t0() + Duration::seconds(1), &[("a", 2)]);
        let remote = task("Remote", t0(), &[("a", 1)]);
        assert_eq!(
            ConflictStrategy::LastWriteWins.resolve(&local, &remote, &remote.vector_clock),
            Resolution::KeepLocal
        );
    }

    #[test]
    fn manual_surfaces_only_concurrent_edits() {
        let local = task("Local", t0(), &[("a", 2), ("b", 1)]);
        let concurrent = task("Remote", t0(), &[("a", 1), ("b", 2)]);
        let descendant = task("Remote", t0(), &[("a", 2), ("b", 2)]);

        assert_eq!(
            ConflictStrategy::Manual.resolve(&local, &concurrent, &concurrent.vector_clock),
            Resolution::Surface
        );
        assert_eq!(
            ConflictStrategy::Manual.resolve(&local, &descendant, &descendant.vector_clock),
            Resolution::AcceptRemote
        );
    }

    #[test]
    fn conflict_wire_shape() {
        let local = task("Local", t0(), &[("a", 1)]);
        let remote = task("Remote", t0(), &[("b", 1)]);
        let conflict = Conflict::between(&local, &remote, &remote.vector_clock);

        let json = serde_json::to_value(&conflict).unwrap();
        assert_eq!(json["taskId"], "t1");
        assert_eq!(json["remoteClock"]["b"], 1);
        assert!(!conflict.is_update_delete_conflict());
    }

    #[test]
    fn strategy_names() {
        assert_eq!(ConflictStrategy::default(), ConflictStrategy::LastWriteWins);
        assert_eq!(
            serde_json::to_string(&ConflictStrategy::Manual).unwrap(),
            "\"manual\""
        );
        assert_eq!(ConflictStrategy::LastWriteWins.as_str(), "last_write_wins");
    }
}
