//! The reqwest-backed transport against a mocked HTTP server.

#![cfg(feature = "http")]

use std::time::Duration;
use tasksync_engine::{HttpTransport, ReqwestClient, SyncApi, SyncError};
use tasksync_protocol::{PullRequest, TokenRefreshRequest, VectorClock};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> HttpTransport<ReqwestClient> {
    let client = ReqwestClient::new(Duration::from_secs(5)).unwrap();
    HttpTransport::new(format!("{}/", server.uri()), client)
}

fn pull_request() -> PullRequest {
    PullRequest {
        device_id: "dev-a".into(),
        since_timestamp: Some(1_700_000_000_000),
        after_task_id: None,
        last_vector_clock: VectorClock::new(),
        limit: 50,
    }
}

#[tokio::test]
async fn pull_sends_bearer_and_camel_case_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/pull"))
        .and(header("authorization", "Bearer tok-1"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "deviceId": "dev-a",
            "sinceTimestamp": 1_700_000_000_000_i64,
            "limit": 50,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tasks": [{
                "id": "t1",
                "encryptedBlob": "AAAA",
                "nonce": "BBBB",
                "vectorClock": { "dev-b": 3 },
                "updatedAt": "2025-03-01T08:00:00Z",
            }],
            "deletedTaskIds": ["t9"],
            "serverVectorClock": { "dev-b": 3 },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(&server);
    transport.set_token(Some("tok-1".into()));
    let response = transport.pull(&pull_request()).await.unwrap();

    assert_eq!(response.tasks[0].id, "t1");
    assert_eq!(response.tasks[0].vector_clock.get("dev-b"), 3);
    assert_eq!(response.deleted_task_ids, vec!["t9".to_string()]);
    assert!(response.conflicts.is_empty());
}

#[tokio::test]
async fn status_codes_map_to_error_kinds() {
    let server = MockServer::start().await;
    Mock::given(path("/sync/pull"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(serde_json::json!({ "error": "expired" })),
        )
        .mount(&server)
        .await;
    Mock::given(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let transport = transport(&server);
    let err = transport.pull(&pull_request()).await.unwrap_err();
    assert!(matches!(err, SyncError::Auth(ref m) if m == "expired"), "{err:?}");
    assert!(err.is_auth());

    let err = transport
        .refresh_token(&TokenRefreshRequest {
            device_id: "dev-a".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Server { status: 503, .. }), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let server = MockServer::start().await;
    let transport = transport(&server);
    drop(server);

    let err = transport.pull(&pull_request()).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)), "{err:?}");
    assert!(transport.last_error().is_some());
}
