//! End-to-end tests: engines on several devices syncing through the
//! reference server over a loopback transport.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tasksync_engine::{
    encode_blob, AesGcmCrypto, EngineConfig, ErrorCategory, HttpClient, HttpResponse,
    HttpTransport, LoopbackClient, LoopbackServer, SyncContext, SyncEngine, PUSH_PATH,
    REFRESH_PATH,
};
use tasksync_protocol::{OperationType, PushOperation, PushRequest, TaskRecord, VectorClock};
use tasksync_server::{ServerConfig, SyncServer};
use tasksync_store::{CycleStatus, FileStore, MemoryStore, SyncConfig, SyncPriority, SyncStore};
use tempfile::tempdir;

const SECRET: &[u8] = b"integration-test-secret";

/// Reference server plus a few knobs for fault injection.
struct Backend {
    server: SyncServer,
    refreshes: AtomicUsize,
    reject_pushes: AtomicUsize,
}

impl Backend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            server: SyncServer::new(ServerConfig::default().with_auth(SECRET.to_vec())),
            refreshes: AtomicUsize::new(0),
            reject_pushes: AtomicUsize::new(0),
        })
    }
}

#[derive(Clone)]
struct Shared(Arc<Backend>);

impl LoopbackServer for Shared {
    fn handle_post(&self, path: &str, bearer: Option<&str>, body: &[u8]) -> HttpResponse {
        if path == REFRESH_PATH {
            self.0.refreshes.fetch_add(1, Ordering::SeqCst);
        }
        if path == PUSH_PATH
            && self
                .0
                .reject_pushes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return HttpResponse::new(401, br#"{"error":"token revoked"}"#.to_vec());
        }
        let reply = self.0.server.handle_post(path, bearer, body);
        HttpResponse::new(reply.status, reply.body)
    }
}

/// Lets a test keep a handle on the loopback client the transport owns.
struct Link(Arc<LoopbackClient<Shared>>);

#[async_trait]
impl HttpClient for Link {
    async fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: Vec<u8>,
    ) -> Result<HttpResponse, String> {
        self.0.post(url, bearer, body).await
    }
}

struct Device {
    engine: SyncEngine,
    store: Arc<dyn SyncStore>,
    client: Arc<LoopbackClient<Shared>>,
}

impl Device {
    fn connect(backend: &Arc<Backend>, store: Arc<dyn SyncStore>) -> Self {
        let client = Arc::new(LoopbackClient::new(Shared(backend.clone())));
        let transport = HttpTransport::new("http://sync.test", Link(client.clone()));
        let crypto = AesGcmCrypto::from_secret(b"shared passphrase", b"account-salt").unwrap();
        let ctx = SyncContext::new(
            store.clone(),
            Arc::new(crypto),
            Arc::new(transport),
            EngineConfig::new("http://sync.test"),
        );
        Self {
            engine: SyncEngine::new(ctx),
            store,
            client,
        }
    }

    fn enrolled(backend: &Arc<Backend>, device_id: &str) -> Self {
        let store: Arc<dyn SyncStore> = Arc::new(MemoryStore::new());
        enroll(backend, store.as_ref(), device_id);
        Self::connect(backend, store)
    }

    fn task(&self, id: &str) -> Option<TaskRecord> {
        self.store.get_task(id).unwrap()
    }
}

fn enroll(backend: &Backend, store: &dyn SyncStore, device_id: &str) {
    let (token, expires_at) = backend.server.issue_token(device_id).unwrap();
    let mut config = SyncConfig::new(device_id);
    config.enabled = true;
    config.token = Some(token);
    // Seconds on the wire, milliseconds at rest.
    config.token_expires_at = Some(expires_at * 1000);
    store.save_config(&config).unwrap();
}

fn new_task(id: &str, title: &str) -> TaskRecord {
    TaskRecord::new(id, title, Utc::now())
}

#[tokio::test]
async fn two_devices_converge() {
    let backend = Backend::new();
    let laptop = Device::enrolled(&backend, "laptop");
    let phone = Device::enrolled(&backend, "phone");

    laptop.engine.recorder().create(new_task("t1", "Write report")).unwrap();
    let result = laptop.engine.sync(SyncPriority::User).await;
    assert_eq!(result.status, CycleStatus::Success, "{result:?}");
    assert_eq!(result.pushed_count, 1);
    assert_eq!(laptop.engine.queue().pending_count().unwrap(), 0);

    let result = phone.engine.sync(SyncPriority::User).await;
    assert_eq!(result.pulled_count, 1);
    let on_phone = phone.task("t1").unwrap();
    assert_eq!(on_phone.title, "Write report");
    assert_eq!(on_phone.vector_clock.get("laptop"), 1);

    // Edit on the phone; the stored clock makes it causally newer.
    let mut edited = on_phone.clone();
    edited.title = "Write quarterly report".into();
    edited.updated_at = on_phone.updated_at + ChronoDuration::seconds(5);
    phone.engine.recorder().update(edited).unwrap();
    let result = phone.engine.sync(SyncPriority::User).await;
    assert_eq!(result.pushed_count, 1, "{result:?}");
    assert!(result.conflicts.is_empty());

    laptop.engine.sync(SyncPriority::User).await;
    let on_laptop = laptop.task("t1").unwrap();
    assert_eq!(on_laptop.title, "Write quarterly report");
    assert_eq!(on_laptop.vector_clock.get("phone"), 1);

    // Delete on the laptop and watch it disappear on the phone.
    assert!(laptop.engine.recorder().delete("t1").unwrap());
    let result = laptop.engine.sync(SyncPriority::User).await;
    assert_eq!(result.pushed_count, 1, "{result:?}");
    assert!(backend.server.log().tombstone("t1").is_some());

    phone.engine.sync(SyncPriority::User).await;
    assert!(phone.task("t1").is_none());

    let laptop_config = laptop.store.load_config().unwrap().unwrap();
    assert!(laptop_config.last_sync_at.is_some());
    assert_eq!(laptop_config.vector_clock.get("phone"), 1);
}

#[tokio::test]
async fn backlog_larger_than_pull_limit_arrives_in_one_cycle() {
    let backend = Backend::new();
    let laptop = Device::enrolled(&backend, "laptop");
    let phone = Device::enrolled(&backend, "phone");

    for i in 0..60 {
        laptop
            .engine
            .recorder()
            .create(new_task(&format!("t{i:02}"), &format!("Task {i}")))
            .unwrap();
    }
    let result = laptop.engine.sync(SyncPriority::User).await;
    assert_eq!(result.pushed_count, 60, "{result:?}");

    let result = phone.engine.sync(SyncPriority::User).await;
    assert_eq!(result.pulled_count, 60, "{result:?}");
    assert_eq!(phone.store.all_tasks().unwrap().len(), 60);

    let result = phone.engine.sync(SyncPriority::User).await;
    assert!(result.is_success(), "{result:?}");
    assert_eq!(phone.store.all_tasks().unwrap().len(), 60);
}

#[tokio::test]
async fn stale_push_surfaces_conflict() {
    let backend = Backend::new();
    let laptop = Device::enrolled(&backend, "laptop");
    let phone = Device::enrolled(&backend, "phone");

    laptop.engine.recorder().create(new_task("t1", "Laptop")).unwrap();
    laptop.engine.sync(SyncPriority::User).await;

    // The phone never saw the laptop's version.
    phone.engine.recorder().create(new_task("t1", "Phone")).unwrap();
    let result = phone.engine.sync(SyncPriority::User).await;

    assert_eq!(result.status, CycleStatus::Conflict);
    assert_eq!(result.pushed_count, 0);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].task_id, "t1");
    assert_eq!(phone.engine.queue().pending_count().unwrap(), 0);
}

#[tokio::test]
async fn expiring_token_refreshed_before_cycle() {
    let backend = Backend::new();
    let store: Arc<dyn SyncStore> = Arc::new(MemoryStore::new());
    enroll(&backend, store.as_ref(), "laptop");
    let mut config = store.load_config().unwrap().unwrap();
    config.token_expires_at = Some(Utc::now().timestamp_millis() + 60_000);
    store.save_config(&config).unwrap();

    let laptop = Device::connect(&backend, store);
    laptop.engine.recorder().create(new_task("t1", "One")).unwrap();
    let result = laptop.engine.sync(SyncPriority::User).await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(backend.refreshes.load(Ordering::SeqCst), 1);
    let refreshed = laptop.store.load_config().unwrap().unwrap();
    assert!(refreshed.token_expires_at.unwrap() > Utc::now().timestamp_millis() + 600_000);
}

#[tokio::test]
async fn unauthorized_push_refreshes_once() {
    let backend = Backend::new();
    let laptop = Device::enrolled(&backend, "laptop");
    laptop.engine.recorder().create(new_task("t1", "One")).unwrap();

    backend.reject_pushes.store(1, Ordering::SeqCst);
    let result = laptop.engine.sync(SyncPriority::User).await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.pushed_count, 1);
    assert_eq!(backend.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeated_unauthorized_fails_cycle() {
    let backend = Backend::new();
    let laptop = Device::enrolled(&backend, "laptop");
    laptop.engine.recorder().create(new_task("t1", "One")).unwrap();

    backend.reject_pushes.store(2, Ordering::SeqCst);
    let result = laptop.engine.sync(SyncPriority::User).await;

    assert_eq!(result.status, CycleStatus::Error);
    assert_eq!(result.error_category, Some(ErrorCategory::Authentication));
    assert_eq!(backend.refreshes.load(Ordering::SeqCst), 1);
    // Nothing was lost.
    assert_eq!(laptop.engine.queue().pending_count().unwrap(), 1);
}

#[tokio::test]
async fn offline_cycle_backs_off_and_keeps_queue() {
    let backend = Backend::new();
    let laptop = Device::enrolled(&backend, "laptop");
    laptop.engine.recorder().create(new_task("t1", "One")).unwrap();

    laptop.client.set_offline(true);
    let result = laptop.engine.sync(SyncPriority::User).await;
    assert_eq!(result.error_category, Some(ErrorCategory::Transient));
    assert_eq!(laptop.engine.retry().retry_status().unwrap().consecutive_failures, 1);

    laptop.client.set_offline(false);
    let deferred = laptop.engine.sync(SyncPriority::Auto).await;
    assert_eq!(deferred.status, CycleStatus::Error);
    assert!(deferred.error.unwrap().contains("backoff"));

    let result = laptop.engine.sync(SyncPriority::User).await;
    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.pushed_count, 1);
    assert_eq!(laptop.engine.retry().retry_status().unwrap().consecutive_failures, 0);
}

#[tokio::test]
async fn undecryptable_remote_task_is_skipped() {
    let backend = Backend::new();
    let phone = Device::enrolled(&backend, "phone");

    // Another device pushes garbage next to a readable task.
    let stranger = Device::enrolled(&backend, "stranger");
    let (token, _) = backend.server.issue_token("stranger").unwrap();
    let request = PushRequest {
        device_id: "stranger".into(),
        client_vector_clock: VectorClock::new(),
        operations: vec![PushOperation {
            op_type: OperationType::Create,
            task_id: "junk".into(),
            vector_clock: [("stranger", 1)].into_iter().collect(),
            encrypted_blob: Some(encode_blob(b"not really ciphertext")),
            nonce: Some(encode_blob(&[0u8; 12])),
            checksum: None,
        }],
    };
    let reply = backend.server.handle_post(
        PUSH_PATH,
        Some(&token),
        &serde_json::to_vec(&request).unwrap(),
    );
    assert_eq!(reply.status, 200);
    stranger.engine.recorder().create(new_task("good", "Readable")).unwrap();
    stranger.engine.sync(SyncPriority::User).await;

    let result = phone.engine.sync(SyncPriority::User).await;
    assert!(result.is_success(), "{result:?}");
    assert!(phone.task("junk").is_none());
    assert_eq!(phone.task("good").unwrap().title, "Readable");
}

#[tokio::test]
async fn file_store_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sync.json");
    let backend = Backend::new();

    {
        let store: Arc<dyn SyncStore> = Arc::new(FileStore::open(&path).unwrap());
        enroll(&backend, store.as_ref(), "laptop");
        let laptop = Device::connect(&backend, store);
        laptop.engine.recorder().create(new_task("t1", "Persisted")).unwrap();

        laptop.client.set_offline(true);
        let result = laptop.engine.sync(SyncPriority::User).await;
        assert_eq!(result.status, CycleStatus::Error);
    }

    let store: Arc<dyn SyncStore> = Arc::new(FileStore::open(&path).unwrap());
    assert_eq!(store.queue_len().unwrap(), 1);
    assert_eq!(store.history(10).unwrap().len(), 1);

    let laptop = Device::connect(&backend, store);
    let result = laptop.engine.sync(SyncPriority::User).await;
    assert_eq!(result.pushed_count, 1, "{result:?}");
    assert_eq!(laptop.engine.queue().pending_count().unwrap(), 0);
    assert!(backend.server.log().get("t1").is_some());
}
