//! API client abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tasksync_protocol::{
    PullRequest, PullResponse, PushRequest, PushResponse, TokenRefreshRequest,
    TokenRefreshResponse,
};

/// Talks to the sync service.
///
/// This is the boundary where failures are classified: every
/// implementation returns the typed [`SyncError`] taxonomy, so nothing above
/// this trait inspects messages or status codes.
///
/// # Implementors
///
/// - [`crate::HttpTransport`] - JSON over HTTP
/// - [`MockApi`] - Scripted responses for testing
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Pushes a batch of local operations.
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Pulls remote changes.
    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Exchanges the current token for a fresh one.
    async fn refresh_token(&self, request: &TokenRefreshRequest)
        -> SyncResult<TokenRefreshResponse>;

    /// Installs the bearer token used by subsequent calls.
    fn set_token(&self, token: Option<String>);

    /// Returns the installed bearer token.
    fn token(&self) -> Option<String>;
}

/// One scripted reply: used once if queued, or on every call if sticky.
#[derive(Debug)]
struct Script<T> {
    queued: VecDeque<SyncResult<T>>,
    sticky: Option<T>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queued: VecDeque::new(),
            sticky: None,
        }
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self, what: &str) -> SyncResult<T> {
        if let Some(result) = self.queued.pop_front() {
            return result;
        }
        self.sticky
            .clone()
            .ok_or_else(|| SyncError::Protocol(format!("no mock {what} response set")))
    }
}

/// A mock API for testing.
///
/// Replies are either sticky (`set_*`, returned on every call) or queued
/// one-shot results (`queue_*`, consumed in order before the sticky reply).
#[derive(Debug, Default)]
pub struct MockApi {
    push: Mutex<Script<PushResponse>>,
    pull: Mutex<Script<PullResponse>>,
    refresh: Mutex<Script<TokenRefreshResponse>>,
    token: Mutex<Option<String>>,
    push_requests: Mutex<Vec<PushRequest>>,
    pull_requests: Mutex<Vec<PullRequest>>,
    push_calls: AtomicUsize,
    pull_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl MockApi {
    /// Creates a mock with no replies set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the push response returned on every call.
    pub fn set_push_response(&self, response: PushResponse) {
        self.push.lock().sticky = Some(response);
    }

    /// Queues a one-shot push result.
    pub fn queue_push_result(&self, result: SyncResult<PushResponse>) {
        self.push.lock().queued.push_back(result);
    }

    /// Sets the pull response returned on every call.
    pub fn set_pull_response(&self, response: PullResponse) {
        self.pull.lock().sticky = Some(response);
    }

    /// Queues a one-shot pull result.
    pub fn queue_pull_result(&self, result: SyncResult<PullResponse>) {
        self.pull.lock().queued.push_back(result);
    }

    /// Sets the refresh response returned on every call.
    pub fn set_refresh_response(&self, response: TokenRefreshResponse) {
        self.refresh.lock().sticky = Some(response);
    }

    /// Queues a one-shot refresh result.
    pub fn queue_refresh_result(&self, result: SyncResult<TokenRefreshResponse>) {
        self.refresh.lock().queued.push_back(result);
    }

    /// Number of push calls so far.
    pub fn push_calls(&self) -> usize {
        self.push_calls.load(Ordering::SeqCst)
    }

    /// Number of pull calls so far.
    pub fn pull_calls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    /// Number of refresh calls so far.
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Every push request received, oldest first.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.push_requests.lock().clone()
    }

    /// Every pull request received, oldest first.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pull_requests.lock().clone()
    }
}

#[async_trait]
impl SyncApi for MockApi {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        self.push_requests.lock().push(request.clone());
        self.push.lock().next("push")
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        self.pull_requests.lock().push(request.clone());
        self.pull.lock().next("pull")
    }

    async fn refresh_token(
        &self,
        _request: &TokenRefreshRequest,
    ) -> SyncResult<TokenRefreshResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh.lock().next("refresh")
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.lock() = token;
    }

    fn token(&self) -> Option<String> {
        self.token.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasksync_protocol::VectorClock;

    fn push_request() -> PushRequest {
        PushRequest {
            device_id: "dev-a".into(),
            client_vector_clock: VectorClock::new(),
            operations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn unset_reply_is_protocol_error() {
        let api = MockApi::new();
        let result = api.push(&push_request()).await;
        assert!(matches!(result, Err(SyncError::Protocol(_))));
        assert_eq!(api.push_calls(), 1);
    }

    #[tokio::test]
    async fn queued_replies_come_first() {
        let api = MockApi::new();
        api.set_push_response(PushResponse {
            accepted: vec!["sticky".into()],
            ..Default::default()
        });
        api.queue_push_result(Err(SyncError::Network("offline".into())));

        assert!(api.push(&push_request()).await.is_err());
        let response = api.push(&push_request()).await.unwrap();
        assert_eq!(response.accepted, vec!["sticky".to_string()]);
        assert_eq!(api.push_requests().len(), 2);
    }

    #[test]
    fn token_roundtrip() {
        let api = MockApi::new();
        assert!(api.token().is_none());
        api.set_token(Some("abc".into()));
        assert_eq!(api.token().as_deref(), Some("abc"));
    }
}
