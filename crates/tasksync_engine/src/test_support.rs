//! Fixtures shared by the unit tests.

use crate::config::EngineConfig;
use crate::context::SyncContext;
use crate::crypto::{AesGcmCrypto, EncryptionKey};
use crate::transport::MockApi;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tasksync_protocol::TaskRecord;
use tasksync_store::{SyncConfig, SyncStore};

pub(crate) const TEST_KEY: [u8; 32] = [42u8; 32];

pub(crate) fn crypto() -> AesGcmCrypto {
    AesGcmCrypto::new(EncryptionKey::from_bytes(&TEST_KEY).unwrap())
}

pub(crate) fn context(store: Arc<dyn SyncStore>) -> (SyncContext, Arc<MockApi>) {
    let api = Arc::new(MockApi::new());
    let ctx = SyncContext::new(
        store,
        Arc::new(crypto()),
        api.clone(),
        EngineConfig::new("http://localhost"),
    );
    (ctx, api)
}

pub(crate) fn enabled_config(device_id: &str) -> SyncConfig {
    let mut config = SyncConfig::new(device_id);
    config.enabled = true;
    config.token = Some(format!("token-{device_id}"));
    config.token_expires_at = Some(Utc::now().timestamp_millis() + 3_600_000);
    config
}

pub(crate) fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

pub(crate) fn task(id: &str, title: &str) -> TaskRecord {
    TaskRecord::new(id, title, at(1_700_000_000_000))
}
