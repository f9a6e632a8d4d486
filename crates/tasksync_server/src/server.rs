//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::tasklog::TaskLog;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tasksync_protocol::VectorClock;
use tracing::{debug, warn};

/// Path of the push endpoint.
pub const PUSH_PATH: &str = "/sync/push";
/// Path of the pull endpoint.
pub const PULL_PATH: &str = "/sync/pull";
/// Path of the token refresh endpoint.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Status code and JSON body of a handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReply {
    /// HTTP status code.
    pub status: u16,
    /// JSON body.
    pub body: Vec<u8>,
}

impl ServerReply {
    fn error(err: &ServerError) -> Self {
        let body = serde_json::to_vec(&serde_json::json!({ "error": err.to_string() }))
            .unwrap_or_default();
        Self {
            status: err.status_code(),
            body,
        }
    }
}

/// The sync server.
///
/// This server handles the push, pull and token refresh endpoints against
/// an in-memory [`TaskLog`].
///
/// # Example
///
/// ```
/// use tasksync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let reply = server.handle_post(
///     "/sync/pull",
///     None,
///     br#"{"deviceId":"a","lastVectorClock":{},"limit":10}"#,
/// );
/// assert_eq!(reply.status, 200);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_log(config, Arc::new(TaskLog::new()))
    }

    /// Creates a sync server over an existing log.
    pub fn with_log(config: ServerConfig, log: Arc<TaskLog>) -> Self {
        let context = Arc::new(HandlerContext::new(config, log));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Issues a bearer token for a device. Expiry is in Unix seconds.
    pub fn issue_token(&self, device_id: &str) -> ServerResult<(String, i64)> {
        self.handler.issue_token(device_id, Utc::now())
    }

    /// Handles a POST to `path` at the current time.
    pub fn handle_post(&self, path: &str, bearer: Option<&str>, body: &[u8]) -> ServerReply {
        self.handle_post_at(path, bearer, body, Utc::now())
    }

    /// Handles a POST to `path` as if received at `now`.
    pub fn handle_post_at(
        &self,
        path: &str,
        bearer: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> ServerReply {
        match self.dispatch(path, bearer, body, now) {
            Ok(body) => ServerReply { status: 200, body },
            Err(e) => {
                if e.is_server_error() {
                    warn!(path, error = %e, "request failed");
                } else {
                    debug!(path, error = %e, "request refused");
                }
                ServerReply::error(&e)
            }
        }
    }

    fn dispatch(
        &self,
        path: &str,
        bearer: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> ServerResult<Vec<u8>> {
        match path {
            PUSH_PATH => {
                let caller = self.handler.authenticate(bearer, now)?;
                encode(&self.handler.handle_push(decode(body)?, caller.as_ref(), now)?)
            }
            PULL_PATH => {
                let caller = self.handler.authenticate(bearer, now)?;
                encode(&self.handler.handle_pull(decode(body)?, caller.as_ref())?)
            }
            REFRESH_PATH => encode(&self.handler.handle_refresh(decode(body)?, bearer, now)?),
            other => Err(ServerError::NotFound(other.to_string())),
        }
    }

    /// Returns the server-wide clock.
    pub fn server_clock(&self) -> VectorClock {
        self.context.log.server_clock()
    }

    /// Returns the number of live tasks.
    pub fn task_count(&self) -> usize {
        self.context.log.len()
    }

    /// Returns the task log.
    pub fn log(&self) -> &Arc<TaskLog> {
        &self.context.log
    }
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("config", &self.context.config)
            .finish_non_exhaustive()
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> ServerResult<T> {
    Ok(tasksync_protocol::decode(body)?)
}

fn encode<T: Serialize>(message: &T) -> ServerResult<Vec<u8>> {
    tasksync_protocol::encode(message)
        .map_err(|e| ServerError::Internal(format!("failed to encode response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn post(server: &SyncServer, path: &str, bearer: Option<&str>, body: Value) -> (u16, Value) {
        let reply = server.handle_post(path, bearer, &serde_json::to_vec(&body).unwrap());
        (reply.status, serde_json::from_slice(&reply.body).unwrap())
    }

    fn push_body(device: &str, task_id: &str, counter: u64) -> Value {
        let mut clock = serde_json::Map::new();
        clock.insert(device.to_string(), json!(counter));
        json!({
            "deviceId": device,
            "clientVectorClock": {},
            "operations": [{
                "type": "create",
                "taskId": task_id,
                "vectorClock": clock,
                "encryptedBlob": "AAAA",
                "nonce": "BBBB",
            }],
        })
    }

    #[test]
    fn server_lifecycle() {
        let server = SyncServer::new(ServerConfig::default());
        assert_eq!(server.task_count(), 0);
        assert!(server.server_clock().is_empty());
    }

    #[test]
    fn full_sync_flow() {
        let server = SyncServer::new(ServerConfig::default());

        let (status, body) = post(&server, PUSH_PATH, None, push_body("a", "t1", 1));
        assert_eq!(status, 200);
        assert_eq!(body["accepted"], json!(["t1"]));
        assert_eq!(body["serverVectorClock"]["a"], 1);

        let (status, body) = post(
            &server,
            PULL_PATH,
            None,
            json!({ "deviceId": "b", "lastVectorClock": {}, "limit": 10 }),
        );
        assert_eq!(status, 200);
        assert_eq!(body["tasks"][0]["id"], "t1");
        assert_eq!(body["tasks"][0]["encryptedBlob"], "AAAA");
        assert_eq!(body["deletedTaskIds"], json!([]));
        assert_eq!(server.task_count(), 1);
    }

    #[test]
    fn error_replies() {
        let server = SyncServer::new(ServerConfig::default());

        let (status, body) = post(&server, "/nope", None, json!({}));
        assert_eq!(status, 404);
        assert!(body["error"].as_str().unwrap().contains("/nope"));

        let reply = server.handle_post(PUSH_PATH, None, b"not json");
        assert_eq!(reply.status, 400);
    }

    #[test]
    fn authenticated_flow() {
        let server = SyncServer::new(ServerConfig::default().with_auth(b"secret".to_vec()));

        let (status, _) = post(&server, PUSH_PATH, None, push_body("a", "t1", 1));
        assert_eq!(status, 401);
        let (status, _) = post(&server, PUSH_PATH, Some("garbage"), push_body("a", "t1", 1));
        assert_eq!(status, 401);

        let (token, _) = server.issue_token("a").unwrap();
        let (status, _) = post(&server, PUSH_PATH, Some(&token), push_body("a", "t1", 1));
        assert_eq!(status, 200);
        let (status, _) = post(&server, PUSH_PATH, Some(&token), push_body("b", "t2", 1));
        assert_eq!(status, 403);

        let (status, body) = post(&server, REFRESH_PATH, Some(&token), json!({ "deviceId": "a" }));
        assert_eq!(status, 200);
        assert!(body["expiresAt"].as_i64().unwrap() < 10_000_000_000);
        assert!(body["token"].as_str().is_some());
    }

    #[test]
    fn expired_token_rejected_then_refreshed() {
        let config = ServerConfig::default()
            .with_auth(b"secret".to_vec())
            .with_token_expiry(std::time::Duration::from_secs(60));
        let server = SyncServer::new(config);
        let (token, _) = server.issue_token("a").unwrap();
        let later = Utc::now() + chrono::Duration::seconds(120);

        let body = serde_json::to_vec(&push_body("a", "t1", 1)).unwrap();
        assert_eq!(server.handle_post_at(PUSH_PATH, Some(&token), &body, later).status, 401);

        let refresh = br#"{"deviceId":"a"}"#;
        let reply = server.handle_post_at(REFRESH_PATH, Some(&token), refresh, later);
        assert_eq!(reply.status, 200);
        let fresh: Value = serde_json::from_slice(&reply.body).unwrap();
        let fresh = fresh["token"].as_str().unwrap();
        assert_eq!(server.handle_post_at(PUSH_PATH, Some(fresh), &body, later).status, 200);
    }
}
