//! Task records.
//!
//! A [`TaskRecord`] is replicated as a whole: the engine never merges
//! individual fields. Fields this crate does not know about are kept in
//! [`TaskRecord::extra`] so that newer clients do not lose data when an
//! older client forwards a record.

use crate::clock::VectorClock;
use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum length of a task title, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// A checklist item inside a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    /// Subtask ID.
    pub id: String,
    /// Subtask title.
    pub title: String,
    /// Whether the subtask is done.
    #[serde(default)]
    pub completed: bool,
}

/// A whole-record task snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Task ID.
    pub id: String,
    /// Title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Urgency flag.
    #[serde(default)]
    pub urgent: bool,
    /// Importance flag.
    #[serde(default)]
    pub important: bool,
    /// Quadrant assigned by the task layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quadrant: Option<String>,
    /// Completion flag.
    #[serde(default)]
    pub completed: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time; drives last-write-wins.
    pub updated_at: DateTime<Utc>,
    /// Optional due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Checklist.
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    /// IDs of tasks this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Causal stamp of the last mutation.
    #[serde(default)]
    pub vector_clock: VectorClock,
    /// Unknown fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskRecord {
    /// Creates a minimal task created and updated at `now`.
    pub fn new(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            urgent: false,
            important: false,
            quadrant: None,
            completed: false,
            created_at: now,
            updated_at: now,
            due_date: None,
            tags: Vec::new(),
            subtasks: Vec::new(),
            dependencies: Vec::new(),
            vector_clock: VectorClock::new(),
            extra: Map::new(),
        }
    }

    /// Checks the record against the task schema.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.id.trim().is_empty() {
            return Err(ProtocolError::invalid_task(&self.id, "id must not be empty"));
        }
        if self.title.trim().is_empty() {
            return Err(ProtocolError::invalid_task(&self.id, "title must not be empty"));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(ProtocolError::invalid_task(
                &self.id,
                format!("title longer than {MAX_TITLE_LEN} characters"),
            ));
        }
        if self.updated_at < self.created_at {
            return Err(ProtocolError::invalid_task(
                &self.id,
                "updatedAt precedes createdAt",
            ));
        }
        if let Some(sub) = self.subtasks.iter().find(|s| s.id.is_empty()) {
            return Err(ProtocolError::invalid_task(
                &self.id,
                format!("subtask '{}' has no id", sub.title),
            ));
        }
        Ok(())
    }

    /// Serializes the record to JSON bytes.
    pub fn to_json_bytes(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses and validates a record from JSON bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> ProtocolResult<Self> {
        let task: TaskRecord = serde_json::from_slice(bytes)?;
        task.validate()?;
        Ok(task)
    }

    /// Converts the record to a JSON value (used when surfacing conflicts).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        "2025-01-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn valid_task_roundtrip() {
        let mut task = TaskRecord::new("t1", "Write report", now());
        task.tags.push("work".into());
        task.vector_clock.increment("dev-a");

        let bytes = task.to_json_bytes().unwrap();
        let back = TaskRecord::from_json_bytes(&bytes).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn unknown_fields_survive() {
        let json = r#"{
            "id": "t1",
            "title": "Plan",
            "createdAt": "2025-01-01T00:00:00Z",
            "updatedAt": "2025-01-01T00:00:00Z",
            "recurrence": {"every": "week"}
        }"#;
        let task = TaskRecord::from_json_bytes(json.as_bytes()).unwrap();
        assert!(task.extra.contains_key("recurrence"));

        let again = serde_json::to_value(&task).unwrap();
        assert_eq!(again["recurrence"]["every"], "week");
    }

    #[test]
    fn rejects_empty_title() {
        let task = TaskRecord::new("t1", "  ", now());
        assert!(matches!(
            task.validate(),
            Err(ProtocolError::InvalidTask { .. })
        ));
    }

    #[test]
    fn rejects_time_travel() {
        let mut task = TaskRecord::new("t1", "Title", now());
        task.updated_at = now() - Duration::seconds(1);
        assert!(task.validate().is_err());
    }

    #[test]
    fn rejects_missing_required_field() {
        let json = r#"{"id": "t1", "title": "No dates"}"#;
        assert!(matches!(
            TaskRecord::from_json_bytes(json.as_bytes()),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn rejects_overlong_title() {
        let task = TaskRecord::new("t1", "x".repeat(MAX_TITLE_LEN + 1), now());
        assert!(task.validate().is_err());
    }
}
