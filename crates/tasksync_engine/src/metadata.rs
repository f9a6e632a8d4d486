//! The persisted sync configuration and history.

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::queue::SyncQueue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tasksync_protocol::{OperationType, VectorClock};
use tasksync_store::{SyncConfig, SyncHistoryEntry, SyncStore};
use tracing::{debug, info, warn};

/// Summary shown by status surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Whether sync is switched on.
    pub enabled: bool,
    /// Start of the last successful cycle (ms).
    pub last_sync_at: Option<i64>,
    /// Queued mutations.
    pub pending_count: usize,
    /// Whether a cycle is in flight.
    pub is_running: bool,
}

/// Owns the [`SyncConfig`] singleton.
#[derive(Clone)]
pub struct MetadataManager {
    store: Arc<dyn SyncStore>,
    queue: SyncQueue,
    history_capacity: usize,
}

impl MetadataManager {
    /// Creates a metadata manager.
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            store: Arc::clone(ctx.store()),
            queue: SyncQueue::new(ctx),
            history_capacity: ctx.config().history_capacity,
        }
    }

    /// Returns the config, if sync was ever enabled.
    pub fn get_sync_config(&self) -> SyncResult<Option<SyncConfig>> {
        Ok(self.store.load_config()?)
    }

    /// Applies `update` to the stored config.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the config was never initialized.
    pub fn update_config(&self, update: impl FnOnce(&mut SyncConfig)) -> SyncResult<SyncConfig> {
        let mut config = self
            .store
            .load_config()?
            .ok_or_else(|| SyncError::config("sync config not initialized"))?;
        update(&mut config);
        self.store.save_config(&config)?;
        Ok(config)
    }

    /// Returns whether sync is enabled.
    pub fn is_enabled(&self) -> SyncResult<bool> {
        Ok(self.store.load_config()?.is_some_and(|c| c.enabled))
    }

    /// Returns the status summary.
    pub fn get_status(&self, is_running: bool) -> SyncResult<SyncStatus> {
        let config = self.store.load_config()?;
        Ok(SyncStatus {
            enabled: config.as_ref().is_some_and(|c| c.enabled),
            last_sync_at: config.and_then(|c| c.last_sync_at),
            pending_count: self.queue.pending_count()?,
            is_running,
        })
    }

    /// Records a completed cycle.
    ///
    /// `last_sync_at` becomes `sync_started_at` and the stored clock absorbs
    /// both `config`'s clock and the server's.
    pub fn update_sync_metadata(
        &self,
        config: &SyncConfig,
        server_vector_clock: &VectorClock,
        sync_started_at: i64,
    ) -> SyncResult<SyncConfig> {
        self.update_config(|stored| {
            stored.last_sync_at = Some(sync_started_at);
            stored.vector_clock = stored
                .vector_clock
                .merged(&config.vector_clock)
                .merged(server_vector_clock);
        })
    }

    /// Queues a `create` for every local task that has nothing queued.
    ///
    /// Does nothing unless sync is enabled.
    pub fn queue_existing_tasks(&self) -> SyncResult<usize> {
        if !self.is_enabled()? {
            return Ok(0);
        }

        let queued = self.queue.queued_task_ids()?;
        let mut count = 0;
        for task in self.store.all_tasks()? {
            if queued.contains(&task.id) {
                continue;
            }
            let task_id = task.id.clone();
            let clock = task.vector_clock.clone();
            self.queue
                .enqueue(OperationType::Create, &task_id, Some(task), clock)?;
            count += 1;
        }

        if count > 0 {
            info!(count, "queued existing tasks");
        }
        Ok(count)
    }

    /// Turns sync on, creating the config on first use.
    ///
    /// On first use every existing task is queued so the server learns about
    /// it. Re-enabling queues only the tasks changed while sync was off.
    pub fn enable(&self, token: impl Into<String>, token_expires_at: i64) -> SyncResult<SyncConfig> {
        let (mut config, created) = match self.store.load_config()? {
            Some(config) => (config, false),
            None => {
                let device_id = uuid::Uuid::new_v4().to_string();
                debug!(device_id = %device_id, "created sync config");
                (SyncConfig::new(device_id), true)
            }
        };
        let changed = std::mem::take(&mut config.changed_while_disabled);
        config.enabled = true;
        config.token = Some(token.into());
        config.token_expires_at = Some(crate::token::normalize_expiry(token_expires_at));
        self.store.save_config(&config)?;
        info!(device_id = %config.device_id, "sync enabled");

        if created {
            self.queue_existing_tasks()?;
        } else {
            self.queue_changed(changed)?;
        }
        Ok(config)
    }

    /// Queues tasks changed while sync was off: an update for each task that
    /// still exists, a delete for each that does not.
    fn queue_changed(&self, changed: BTreeMap<String, VectorClock>) -> SyncResult<usize> {
        let count = changed.len();
        for (task_id, clock) in changed {
            let (operation, clock, payload) = match self.store.get_task(&task_id)? {
                Some(task) => (OperationType::Update, task.vector_clock.clone(), Some(task)),
                None => (OperationType::Delete, clock, None),
            };
            self.queue.enqueue(operation, &task_id, payload, clock)?;
        }
        if count > 0 {
            info!(count, "queued tasks changed while sync was off");
        }
        Ok(count)
    }

    /// Turns sync off, keeping the config.
    pub fn disable(&self) -> SyncResult<()> {
        self.update_config(|c| c.enabled = false)?;
        info!("sync disabled");
        Ok(())
    }

    /// Returns up to `limit` history lines, newest first.
    pub fn history(&self, limit: usize) -> SyncResult<Vec<SyncHistoryEntry>> {
        Ok(self.store.history(limit)?)
    }

    /// Appends a history line. Failures are logged, never returned.
    pub fn record_history(&self, entry: SyncHistoryEntry) {
        if let Err(e) = self.store.append_history(entry, self.history_capacity) {
            warn!(error = %e, "failed to record sync history");
        }
    }
}

impl std::fmt::Debug for MetadataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataManager")
            .field("history_capacity", &self.history_capacity)
            .finish_non_exhaustive()
    }
}
