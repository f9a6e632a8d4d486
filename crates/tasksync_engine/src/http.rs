//! HTTP transport implementation.
//!
//! This module provides a JSON-over-HTTP implementation of [`SyncApi`].
//! The actual HTTP client is abstracted via a trait so that production code
//! can plug in reqwest while tests route requests straight into an
//! in-process server.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncApi;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tasksync_protocol::{
    PullRequest, PullResponse, PushRequest, PushResponse, TokenRefreshRequest,
    TokenRefreshResponse,
};
use tracing::debug;

/// Path of the push endpoint.
pub const PUSH_PATH: &str = "/sync/push";
/// Path of the pull endpoint.
pub const PULL_PATH: &str = "/sync/pull";
/// Path of the token refresh endpoint.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Error body returned by the sync service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}

/// HTTP client abstraction.
///
/// `Err` means no response was received at all (DNS, connect, timeout);
/// any response, whatever its status, is `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a JSON POST request.
    async fn post(&self, url: &str, bearer: Option<&str>, body: Vec<u8>)
        -> Result<HttpResponse, String>;
}

/// HTTP-based sync API.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the sync server (e.g., "https://sync.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Bearer token.
    token: RwLock<Option<String>>,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            token: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn fail(&self, err: SyncError) -> SyncError {
        *self.last_error.write() = Some(err.to_string());
        err
    }

    async fn post_json<Req, Res>(&self, endpoint: &str, request: &Req) -> SyncResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;

        let url = format!("{}{}", self.base_url, endpoint);
        let token = self.token.read().clone();

        let response = self
            .client
            .post(&url, token.as_deref(), body)
            .await
            .map_err(|e| self.fail(SyncError::Network(e)))?;

        debug!(endpoint, status = response.status, "sync api response");

        if !response.is_success() {
            return Err(self.fail(classify_status(response.status, &response.body)));
        }

        *self.last_error.write() = None;

        serde_json::from_slice(&response.body).map_err(|e| {
            self.fail(SyncError::Protocol(format!(
                "failed to decode response: {e}"
            )))
        })
    }
}

/// Maps a non-2xx response onto the error taxonomy.
pub fn classify_status(status: u16, body: &[u8]) -> SyncError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());

    match status {
        401 | 403 => SyncError::Auth(message),
        // Request timeout and rate limiting clear up on their own.
        408 | 429 => SyncError::Server { status, message },
        400..=499 => SyncError::Validation(message),
        500..=599 => SyncError::Server { status, message },
        _ => SyncError::Protocol(format!("unexpected status {status}: {message}")),
    }
}

#[async_trait]
impl<C: HttpClient> SyncApi for HttpTransport<C> {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.post_json(PUSH_PATH, request).await
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.post_json(PULL_PATH, request).await
    }

    async fn refresh_token(
        &self,
        request: &TokenRefreshRequest,
    ) -> SyncResult<TokenRefreshResponse> {
        self.post_json(REFRESH_PATH, request).await
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST request.
    fn handle_post(&self, path: &str, bearer: Option<&str>, body: &[u8]) -> HttpResponse;
}

/// A loopback HTTP client that routes requests directly to a sync server.
///
/// Useful for testing without actual network overhead. Taking the client
/// offline makes every request fail as if the connection were refused.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    offline: AtomicBool,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            offline: AtomicBool::new(false),
        }
    }

    /// Simulates losing or regaining the network.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: Vec<u8>,
    ) -> Result<HttpResponse, String> {
        if self.offline.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }

        let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
        let path = rest.find('/').map_or("/", |i| &rest[i..]);

        Ok(self.server.handle_post(path, bearer, &body))
    }
}
