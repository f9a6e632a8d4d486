//! One sync cycle: token, push, pull, metadata.

use crate::context::{now_millis, SyncContext};
use crate::error::{ErrorCategory, SyncError, SyncResult};
use crate::metadata::MetadataManager;
use crate::mutation::MutationRecorder;
use crate::pull::{PullHandler, PullOutcome};
use crate::push::{PushHandler, PushOutcome};
use crate::queue::SyncQueue;
use crate::retry::RetryManager;
use crate::token::TokenManager;
use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tasksync_protocol::Conflict;
use tasksync_store::{CycleStatus, SyncConfig, SyncHistoryEntry, SyncPriority};
use tracing::{debug, info, warn};

/// What the engine is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No cycle in flight.
    Idle,
    /// Making sure the bearer token is valid.
    Authenticating,
    /// Collapsing queued entries before push.
    Consolidating,
    /// Sending queued mutations.
    Pushing,
    /// Fetching remote changes.
    Pulling,
    /// Persisting the cycle's metadata.
    Finalizing,
}

impl SyncPhase {
    /// Returns true while a cycle is in flight.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncPhase::Idle)
    }
}

/// Statistics about sync cycles since the engine was created.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that completed push and pull.
    pub cycles_completed: u64,
    /// Cycles that ended in an error or were skipped.
    pub cycles_failed: u64,
    /// Tasks accepted by the server.
    pub tasks_pushed: u64,
    /// Remote tasks received.
    pub tasks_pulled: u64,
    /// Conflicts surfaced.
    pub conflicts_encountered: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCycleResult {
    /// Outcome class.
    pub status: CycleStatus,
    /// Priority the cycle ran with.
    pub priority: SyncPriority,
    /// Tasks accepted by the server.
    pub pushed_count: u32,
    /// Remote tasks processed.
    pub pulled_count: u32,
    /// Conflicts surfaced by push or pull.
    pub conflicts: Vec<Conflict>,
    /// User-facing error message.
    pub error: Option<String>,
    /// Category of the error, if the cycle ran and failed.
    pub error_category: Option<ErrorCategory>,
    /// Cycle start (ms).
    pub started_at: i64,
    /// Duration of the cycle.
    pub duration: Duration,
}

impl SyncCycleResult {
    /// Returns true unless the cycle failed or was skipped.
    pub fn is_success(&self) -> bool {
        self.status != CycleStatus::Error
    }

    fn skipped(priority: SyncPriority, started_at: i64, message: impl Into<String>) -> Self {
        Self {
            status: CycleStatus::Error,
            priority,
            pushed_count: 0,
            pulled_count: 0,
            conflicts: Vec::new(),
            error: Some(message.into()),
            error_category: None,
            started_at,
            duration: Duration::ZERO,
        }
    }

    /// The history line describing this result.
    pub fn history_entry(&self) -> SyncHistoryEntry {
        SyncHistoryEntry {
            timestamp: now_millis(),
            status: self.status,
            priority: self.priority,
            pushed_count: self.pushed_count,
            pulled_count: self.pulled_count,
            conflict_count: count(self.conflicts.len()),
            duration_ms: u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
            message: self.error.clone(),
        }
    }
}

struct CycleTotals {
    pushed: u32,
    pulled: u32,
    conflicts: Vec<Conflict>,
}

/// Runs sync cycles against one [`SyncContext`].
///
/// The engine itself does not serialize cycles; share it through a
/// [`crate::SyncCoordinator`] so that at most one runs at a time.
pub struct SyncEngine {
    ctx: SyncContext,
    queue: SyncQueue,
    retry: RetryManager,
    token: TokenManager,
    push: PushHandler,
    pull: PullHandler,
    metadata: MetadataManager,
    recorder: MutationRecorder,
    phase: RwLock<SyncPhase>,
    stats: RwLock<SyncStats>,
}

impl SyncEngine {
    /// Creates an engine and its managers.
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            queue: SyncQueue::new(&ctx),
            retry: RetryManager::new(&ctx),
            token: TokenManager::new(&ctx),
            push: PushHandler::new(&ctx),
            pull: PullHandler::new(&ctx),
            metadata: MetadataManager::new(&ctx),
            recorder: MutationRecorder::new(&ctx),
            phase: RwLock::new(SyncPhase::Idle),
            stats: RwLock::new(SyncStats::default()),
            ctx,
        }
    }

    /// Returns the context.
    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Returns the outbound queue.
    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Returns the retry manager.
    pub fn retry(&self) -> &RetryManager {
        &self.retry
    }

    /// Returns the token manager.
    pub fn token(&self) -> &TokenManager {
        &self.token
    }

    /// Returns the metadata manager.
    pub fn metadata(&self) -> &MetadataManager {
        &self.metadata
    }

    /// Returns the recorder for local task changes.
    pub fn recorder(&self) -> &MutationRecorder {
        &self.recorder
    }

    /// Gets the current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.write() = phase;
    }

    /// Runs one full cycle.
    ///
    /// Never fails: every error ends up in the returned result and in the
    /// history log. Transient errors feed the retry backoff; authentication
    /// and permanent errors do not.
    pub async fn sync(&self, priority: SyncPriority) -> SyncCycleResult {
        let start = Instant::now();
        let started_at = now_millis();

        let result = match self.precheck(priority) {
            Err(message) => {
                debug!(priority = %priority, reason = %message, "sync cycle skipped");
                SyncCycleResult::skipped(priority, started_at, message)
            }
            Ok(()) => {
                let outcome = self.run(started_at).await;
                self.set_phase(SyncPhase::Idle);
                self.finish(priority, started_at, start.elapsed(), outcome)
            }
        };

        self.update_stats(&result);
        self.metadata.record_history(result.history_entry());
        result
    }

    /// Decides whether a cycle may start.
    fn precheck(&self, priority: SyncPriority) -> Result<(), String> {
        let config = match self.metadata.get_sync_config() {
            Ok(config) => config,
            Err(e) => return Err(e.user_message()),
        };
        match config {
            Some(config) if config.enabled => {}
            _ => return Err("sync is not enabled".into()),
        }

        if priority == SyncPriority::User {
            return Ok(());
        }

        match (self.retry.should_retry(), self.retry.can_sync_now()) {
            (Ok(false), _) => Err(format!(
                "automatic sync paused after {} consecutive failures; sync manually to retry",
                self.ctx.config().retry.max_consecutive_failures
            )),
            (_, Ok(false)) => Err("automatic sync deferred by retry backoff".into()),
            (Err(e), _) | (_, Err(e)) => Err(e.user_message()),
            (Ok(true), Ok(true)) => Ok(()),
        }
    }

    async fn run(&self, started_at: i64) -> SyncResult<CycleTotals> {
        self.set_phase(SyncPhase::Authenticating);
        if !self.token.ensure_valid_token().await? {
            return Err(SyncError::Auth("token refresh failed".into()));
        }

        if self.ctx.config().consolidate_before_push {
            self.set_phase(SyncPhase::Consolidating);
            self.queue.consolidate_all()?;
        }

        self.set_phase(SyncPhase::Pushing);
        let pushed = self.push_phase().await?;

        self.set_phase(SyncPhase::Pulling);
        let pulled = self.pull_phase().await?;

        self.set_phase(SyncPhase::Finalizing);
        let config = self.current_config()?;
        let server_clock = pushed
            .server_vector_clock
            .unwrap_or_default()
            .merged(&pulled.server_vector_clock);
        self.metadata
            .update_sync_metadata(&config, &server_clock, started_at)?;
        self.retry.record_success()?;

        let mut conflicts = pushed.conflicts;
        conflicts.extend(pulled.conflicts);
        Ok(CycleTotals {
            pushed: count(pushed.accepted.len()),
            pulled: count(pulled.tasks.len()),
            conflicts,
        })
    }

    async fn push_phase(&self) -> SyncResult<PushOutcome> {
        let config = self.current_config()?;
        match self.push.push(&config).await {
            Err(e) if e.is_auth() => {
                self.reauthenticate(&e).await?;
                let config = self.current_config()?;
                self.push.push(&config).await
            }
            other => other,
        }
    }

    async fn pull_phase(&self) -> SyncResult<PullOutcome> {
        let config = self.current_config()?;
        match self.pull.pull(&config).await {
            Err(e) if e.is_auth() => {
                self.reauthenticate(&e).await?;
                let config = self.current_config()?;
                self.pull.pull(&config).await
            }
            other => other,
        }
    }

    async fn reauthenticate(&self, cause: &SyncError) -> SyncResult<()> {
        warn!(error = %cause, "request unauthorized, refreshing token");
        if self.token.handle_unauthorized().await {
            Ok(())
        } else {
            Err(SyncError::Auth("token refresh failed".into()))
        }
    }

    fn current_config(&self) -> SyncResult<SyncConfig> {
        self.metadata
            .get_sync_config()?
            .ok_or_else(|| SyncError::config("sync config not initialized"))
    }

    fn finish(
        &self,
        priority: SyncPriority,
        started_at: i64,
        duration: Duration,
        outcome: SyncResult<CycleTotals>,
    ) -> SyncCycleResult {
        match outcome {
            Ok(totals) => {
                let status = if totals.conflicts.is_empty() {
                    CycleStatus::Success
                } else {
                    CycleStatus::Conflict
                };
                info!(
                    priority = %priority,
                    status = %status,
                    pushed = totals.pushed,
                    pulled = totals.pulled,
                    conflicts = totals.conflicts.len(),
                    duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    "sync cycle complete"
                );
                SyncCycleResult {
                    status,
                    priority,
                    pushed_count: totals.pushed,
                    pulled_count: totals.pulled,
                    conflicts: totals.conflicts,
                    error: None,
                    error_category: None,
                    started_at,
                    duration,
                }
            }
            Err(e) => {
                let category = e.category();
                if category == ErrorCategory::Transient {
                    if let Err(record_err) = self.retry.record_failure(&e) {
                        warn!(error = %record_err, "failed to record sync failure");
                    }
                }
                warn!(
                    priority = %priority,
                    category = ?category,
                    error = %e,
                    "sync cycle failed"
                );
                SyncCycleResult {
                    status: CycleStatus::Error,
                    priority,
                    pushed_count: 0,
                    pulled_count: 0,
                    conflicts: Vec::new(),
                    error: Some(e.user_message()),
                    error_category: Some(category),
                    started_at,
                    duration,
                }
            }
        }
    }

    fn update_stats(&self, result: &SyncCycleResult) {
        let mut stats = self.stats.write();
        if result.is_success() {
            stats.cycles_completed += 1;
            stats.tasks_pushed += u64::from(result.pushed_count);
            stats.tasks_pulled += u64::from(result.pulled_count);
            stats.conflicts_encountered += result.conflicts.len() as u64;
            stats.last_error = None;
        } else {
            stats.cycles_failed += 1;
            stats.last_error = result.error.clone();
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
