//! Error types for protocol encoding and validation.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding or validating messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A task record violates the task schema.
    #[error("invalid task {task_id}: {reason}")]
    InvalidTask {
        /// Offending task id (may be empty).
        task_id: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl ProtocolError {
    /// Creates an invalid task error.
    pub fn invalid_task(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTask {
            task_id: task_id.into(),
            reason: reason.into(),
        }
    }
}
