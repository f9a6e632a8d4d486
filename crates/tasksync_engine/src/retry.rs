//! Backoff bookkeeping for transient failures.

use crate::config::RetryConfig;
use crate::context::{now_millis, SyncContext};
use crate::error::{SyncError, SyncResult};
use std::sync::Arc;
use tasksync_store::{SyncConfig, SyncStore};
use tracing::{info, warn};

/// Snapshot of the backoff state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStatus {
    /// Transient failures since the last success.
    pub consecutive_failures: u32,
    /// Time of the last failure (ms).
    pub last_failure_at: Option<i64>,
    /// Message of the last failure.
    pub last_failure_reason: Option<String>,
    /// Earliest automatic retry (ms).
    pub next_retry_at: Option<i64>,
    /// Whether automatic retries are still allowed.
    pub should_retry: bool,
}

/// Tracks consecutive failures in the persisted config.
#[derive(Clone)]
pub struct RetryManager {
    store: Arc<dyn SyncStore>,
    config: RetryConfig,
}

impl RetryManager {
    /// Creates a retry manager.
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            store: Arc::clone(ctx.store()),
            config: ctx.config().retry.clone(),
        }
    }

    /// Delay in milliseconds after `failures` consecutive failures.
    pub fn get_next_retry_delay(&self, failures: u32) -> i64 {
        i64::try_from(self.config.delay_for_attempt(failures).as_millis()).unwrap_or(i64::MAX)
    }

    /// Records a transient failure and schedules the next retry.
    pub fn record_failure(&self, error: &SyncError) -> SyncResult<SyncConfig> {
        self.record_failure_at(&error.to_string(), now_millis())
    }

    /// Records a failure at a given time.
    pub fn record_failure_at(&self, reason: &str, now: i64) -> SyncResult<SyncConfig> {
        let mut config = self.require_config()?;
        config.consecutive_failures = config.consecutive_failures.saturating_add(1);
        config.last_failure_at = Some(now);
        config.last_failure_reason = Some(reason.to_string());
        let delay = self.get_next_retry_delay(config.consecutive_failures);
        config.next_retry_at = Some(now.saturating_add(delay));
        self.store.save_config(&config)?;

        warn!(
            failures = config.consecutive_failures,
            delay_ms = delay,
            reason,
            "sync failed, backing off"
        );
        Ok(config)
    }

    /// Clears the failure state.
    pub fn record_success(&self) -> SyncResult<()> {
        let mut config = self.require_config()?;
        if config.consecutive_failures > 0 {
            info!(
                failures = config.consecutive_failures,
                "sync recovered"
            );
        }
        config.consecutive_failures = 0;
        config.last_failure_at = None;
        config.last_failure_reason = None;
        config.next_retry_at = None;
        self.store.save_config(&config)?;
        Ok(())
    }

    /// Returns false once the failure limit is reached.
    pub fn should_retry(&self) -> SyncResult<bool> {
        Ok(self
            .store
            .load_config()?
            .map_or(true, |c| c.consecutive_failures < self.config.max_consecutive_failures))
    }

    /// Returns true if no retry is scheduled or its time has come.
    pub fn can_sync_now(&self) -> SyncResult<bool> {
        self.can_sync_now_at(now_millis())
    }

    /// Like [`can_sync_now`](Self::can_sync_now) at a given time.
    pub fn can_sync_now_at(&self, now: i64) -> SyncResult<bool> {
        Ok(self
            .store
            .load_config()?
            .and_then(|c| c.next_retry_at)
            .map_or(true, |at| at <= now))
    }

    /// Returns the current backoff state.
    pub fn retry_status(&self) -> SyncResult<RetryStatus> {
        let config = self.store.load_config()?;
        let status = match config {
            Some(c) => RetryStatus {
                should_retry: c.consecutive_failures < self.config.max_consecutive_failures,
                consecutive_failures: c.consecutive_failures,
                last_failure_at: c.last_failure_at,
                last_failure_reason: c.last_failure_reason,
                next_retry_at: c.next_retry_at,
            },
            None => RetryStatus {
                consecutive_failures: 0,
                last_failure_at: None,
                last_failure_reason: None,
                next_retry_at: None,
                should_retry: true,
            },
        };
        Ok(status)
    }

    fn require_config(&self) -> SyncResult<SyncConfig> {
        self.store
            .load_config()?
            .ok_or_else(|| SyncError::config("sync config not initialized"))
    }
}

impl std::fmt::Debug for RetryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
