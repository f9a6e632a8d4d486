//! Error types for the sync engine.
//!
//! Errors are classified once, at the API-client boundary, into a closed
//! taxonomy. Retry and token handling dispatch on [`ErrorCategory`], never
//! on message text.

use tasksync_protocol::ProtocolError;
use tasksync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// How the engine reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network trouble or a 5xx: back off and retry automatically.
    Transient,
    /// 401/403 or an expired token: refresh the token, do not count as a failure.
    Authentication,
    /// Everything else: surface verbatim, do not retry.
    Permanent,
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The server refused our credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server refused the request as malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The server failed to handle the request.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Encryption or decryption failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Sync is not configured, or is configured inconsistently.
    #[error("configuration error: {0}")]
    Config(String),

    /// Local persistence failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

impl SyncError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Classifies this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Network(_) | SyncError::Server { .. } => ErrorCategory::Transient,
            SyncError::Auth(_) => ErrorCategory::Authentication,
            SyncError::Validation(_)
            | SyncError::Protocol(_)
            | SyncError::Crypto(_)
            | SyncError::Config(_)
            | SyncError::Store(_) => ErrorCategory::Permanent,
        }
    }

    /// Returns true if this error can be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Returns true if this error should trigger a token refresh.
    pub fn is_auth(&self) -> bool {
        self.category() == ErrorCategory::Authentication
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::Transient => format!("{self}; will retry automatically"),
            ErrorCategory::Authentication => format!("{self}; please re-authenticate"),
            ErrorCategory::Permanent => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert!(SyncError::Network("connection reset".into()).is_retryable());
        assert!(SyncError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(SyncError::Auth("expired".into()).is_auth());
        assert!(!SyncError::Auth("expired".into()).is_retryable());
        assert_eq!(
            SyncError::Validation("bad field".into()).category(),
            ErrorCategory::Permanent
        );
        assert_eq!(
            SyncError::Crypto("tag mismatch".into()).category(),
            ErrorCategory::Permanent
        );
    }

    #[test]
    fn user_messages() {
        let msg = SyncError::Network("timed out".into()).user_message();
        assert!(msg.contains("will retry automatically"));

        let msg = SyncError::Auth("401".into()).user_message();
        assert!(msg.contains("re-authenticate"));

        let msg = SyncError::Validation("title too long".into()).user_message();
        assert_eq!(msg, "validation error: title too long");
    }

    #[test]
    fn protocol_errors_convert() {
        let err: SyncError = tasksync_protocol::ProtocolError::invalid_task("t1", "empty").into();
        assert!(matches!(err, SyncError::Protocol(_)));
    }
}
