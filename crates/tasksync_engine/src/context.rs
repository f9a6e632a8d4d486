//! Dependencies shared by every engine component.

use crate::config::EngineConfig;
use crate::crypto::CryptoProvider;
use crate::transport::SyncApi;
use std::sync::Arc;
use tasksync_store::SyncStore;

/// Everything the engine needs from the outside world.
///
/// Built once by the application and handed to [`crate::SyncEngine`], which
/// clones it into each manager. Tests substitute a
/// [`tasksync_store::MemoryStore`] and a [`crate::MockApi`].
#[derive(Clone)]
pub struct SyncContext {
    store: Arc<dyn SyncStore>,
    crypto: Arc<dyn CryptoProvider>,
    api: Arc<dyn SyncApi>,
    config: EngineConfig,
}

impl SyncContext {
    /// Creates a context.
    pub fn new(
        store: Arc<dyn SyncStore>,
        crypto: Arc<dyn CryptoProvider>,
        api: Arc<dyn SyncApi>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            crypto,
            api,
            config,
        }
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.store
    }

    /// Returns the crypto provider.
    pub fn crypto(&self) -> &Arc<dyn CryptoProvider> {
        &self.crypto
    }

    /// Returns the API client.
    pub fn api(&self) -> &Arc<dyn SyncApi> {
        &self.api
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Current time as Unix epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
