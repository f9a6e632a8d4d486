//! Protocol messages for sync.
//!
//! All messages travel as camelCase JSON. Encrypted blobs and nonces are
//! base64 strings produced by the client; the server never sees plaintext.

use crate::clock::VectorClock;
use crate::conflict::Conflict;
use crate::error::ProtocolResult;
use crate::operation::OperationType;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Default maximum number of records requested per pull.
pub const DEFAULT_PULL_LIMIT: u32 = 50;

/// Encodes a message to JSON bytes.
pub fn encode<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Decodes a message from JSON bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// One mutation inside a push batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOperation {
    /// Mutation kind.
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// Target task.
    pub task_id: String,
    /// Clock of the queued entry.
    pub vector_clock: VectorClock,
    /// Base64 ciphertext of the task JSON (absent for deletes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_blob: Option<String>,
    /// Base64 nonce used for the ciphertext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Checksum of the plaintext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl PushOperation {
    /// Creates a delete operation.
    pub fn delete(task_id: impl Into<String>, vector_clock: VectorClock) -> Self {
        Self {
            op_type: OperationType::Delete,
            task_id: task_id.into(),
            vector_clock,
            encrypted_blob: None,
            nonce: None,
            checksum: None,
        }
    }
}

/// Push request from client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Sending device.
    pub device_id: String,
    /// Causal state of the sending device.
    pub client_vector_clock: VectorClock,
    /// Mutations in enqueue order.
    pub operations: Vec<PushOperation>,
}

/// A mutation the server refused without a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedOperation {
    /// Task ID.
    pub task_id: String,
    /// Short machine-readable reason.
    pub reason: String,
    /// Human-readable details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Push response from server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Task IDs the server stored.
    #[serde(default)]
    pub accepted: Vec<String>,
    /// Mutations refused for validation or quota reasons.
    #[serde(default)]
    pub rejected: Vec<RejectedOperation>,
    /// Mutations superseded by a remote version.
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    /// Server causal state after the push.
    #[serde(default)]
    pub server_vector_clock: VectorClock,
}

/// Pull request from client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Requesting device.
    pub device_id: String,
    /// Only return changes at or after this time (Unix millis).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_timestamp: Option<i64>,
    /// Resume after this task among those changed exactly at
    /// `since_timestamp`. Set when continuing a truncated pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_task_id: Option<String>,
    /// Causal state of the requesting device.
    pub last_vector_clock: VectorClock,
    /// Maximum number of tasks to return.
    pub limit: u32,
}

/// An encrypted task as stored by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTask {
    /// Task ID.
    pub id: String,
    /// Base64 ciphertext.
    pub encrypted_blob: String,
    /// Base64 nonce.
    pub nonce: String,
    /// Clock the record was pushed with.
    #[serde(default)]
    pub vector_clock: VectorClock,
    /// Server-side modification time.
    pub updated_at: DateTime<Utc>,
}

/// Pull response from server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Changed tasks.
    #[serde(default)]
    pub tasks: Vec<RemoteTask>,
    /// Tasks deleted remotely.
    #[serde(default)]
    pub deleted_task_ids: Vec<String>,
    /// Server causal state.
    #[serde(default)]
    pub server_vector_clock: VectorClock,
    /// Always empty from current servers.
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    /// More tasks are waiting past the last one returned.
    #[serde(default)]
    pub has_more: bool,
}

/// Token refresh request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshRequest {
    /// Device asking for a fresh token.
    pub device_id: String,
}

/// Token refresh response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshResponse {
    /// New bearer token.
    pub token: String,
    /// Expiry, in seconds or milliseconds since the epoch.
    pub expires_at: i64,
}
