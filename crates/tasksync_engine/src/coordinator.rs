//! Single-flight scheduling of sync cycles.

use crate::engine::{SyncCycleResult, SyncEngine};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tasksync_store::SyncPriority;
use tracing::{debug, warn};

/// Something that can run one sync cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    /// Runs a cycle with the given priority.
    async fn run_cycle(&self, priority: SyncPriority) -> SyncCycleResult;
}

#[async_trait]
impl CycleRunner for SyncEngine {
    async fn run_cycle(&self, priority: SyncPriority) -> SyncCycleResult {
        self.sync(priority).await
    }
}

/// What happened to a sync request.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncRequest {
    /// The request ran; this is its result.
    Completed(SyncCycleResult),
    /// A cycle was already running; the request will run after it with the
    /// given (possibly upgraded) priority.
    Queued(SyncPriority),
}

/// Snapshot of the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorStatus {
    /// Whether a cycle is in flight.
    pub is_running: bool,
    /// Number of queued requests (0 or 1).
    pub pending_requests: usize,
    /// Priority of the queued request.
    pub pending_priority: Option<SyncPriority>,
    /// Result of the most recent cycle.
    pub last_result: Option<SyncCycleResult>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    running: bool,
    pending: Option<SyncPriority>,
    last_result: Option<SyncCycleResult>,
}

/// Serializes sync requests.
///
/// At most one cycle runs at a time and at most one request waits behind
/// it. Waiting requests are deduplicated: a `User` request upgrades a
/// waiting `Auto` one, and an `Auto` request never downgrades a waiting
/// `User` one. The caller whose request started the run drives the queued
/// requests too, until none are left.
///
/// One coordinator is owned by the application entry point and shared by
/// reference.
pub struct SyncCoordinator<R: CycleRunner> {
    runner: Arc<R>,
    state: Mutex<CoordinatorState>,
}

impl<R: CycleRunner> SyncCoordinator<R> {
    /// Creates a coordinator.
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    /// Returns the runner.
    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    /// Requests a sync cycle.
    pub async fn request_sync(&self, priority: SyncPriority) -> SyncRequest {
        {
            let mut state = self.state.lock();
            if state.running {
                let pending = state
                    .pending
                    .map_or(priority, |waiting| waiting.upgrade(priority));
                state.pending = Some(pending);
                debug!(requested = %priority, pending = %pending, "sync in flight, request queued");
                return SyncRequest::Queued(pending);
            }
            state.running = true;
        }

        let mut guard = RunGuard {
            state: &self.state,
            armed: true,
        };
        let first = self.runner.run_cycle(priority).await;
        let mut next = self.complete(&first);
        while let Some(priority) = next {
            debug!(priority = %priority, "running queued sync request");
            let result = self.runner.run_cycle(priority).await;
            next = self.complete(&result);
        }
        guard.armed = false;

        SyncRequest::Completed(first)
    }

    /// Stores `result` and hands back the queued request, or goes idle.
    fn complete(&self, result: &SyncCycleResult) -> Option<SyncPriority> {
        let mut state = self.state.lock();
        state.last_result = Some(result.clone());
        let next = state.pending.take();
        if next.is_none() {
            state.running = false;
        }
        next
    }

    /// Returns whether a cycle is in flight.
    pub fn is_syncing(&self) -> bool {
        self.state.lock().running
    }

    /// Drops the queued request, if any. Returns whether one was dropped.
    pub fn cancel_pending(&self) -> bool {
        let cancelled = self.state.lock().pending.take();
        if let Some(priority) = cancelled {
            debug!(priority = %priority, "cancelled queued sync request");
        }
        cancelled.is_some()
    }

    /// Returns a status snapshot.
    pub fn status(&self) -> CoordinatorStatus {
        let state = self.state.lock();
        CoordinatorStatus {
            is_running: state.running,
            pending_requests: usize::from(state.pending.is_some()),
            pending_priority: state.pending,
            last_result: state.last_result.clone(),
        }
    }
}

/// Returns the coordinator to idle if the driving future is dropped
/// mid-cycle. The queued request goes with it, since nothing is left to run it.
struct RunGuard<'a> {
    state: &'a Mutex<CoordinatorState>,
    armed: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        state.running = false;
        let dropped = state.pending.take();
        warn!(pending = ?dropped, "sync request dropped before its cycle finished");
    }
}

impl<R: CycleRunner> std::fmt::Debug for SyncCoordinator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SyncCoordinator")
            .field("running", &state.running)
            .field("pending", &state.pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tasksync_store::CycleStatus;
    use tokio::sync::Semaphore;

    /// Records each cycle and blocks it until a permit is released.
    struct GatedRunner {
        calls: Mutex<Vec<SyncPriority>>,
        gate: Semaphore,
    }

    impl GatedRunner {
        fn new(permits: usize) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                gate: Semaphore::new(permits),
            }
        }

        fn calls(&self) -> Vec<SyncPriority> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl CycleRunner for GatedRunner {
        async fn run_cycle(&self, priority: SyncPriority) -> SyncCycleResult {
            self.calls.lock().push(priority);
            self.gate.acquire().await.unwrap().forget();
            SyncCycleResult {
                status: CycleStatus::Success,
                priority,
                pushed_count: 0,
                pulled_count: 0,
                conflicts: Vec::new(),
                error: None,
                error_category: None,
                started_at: 0,
                duration: Duration::ZERO,
            }
        }
    }

    async fn wait_until_running<R: CycleRunner>(coordinator: &SyncCoordinator<R>) {
        while !coordinator.is_syncing() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn idle_request_runs_immediately() {
        let coordinator = SyncCoordinator::new(Arc::new(GatedRunner::new(1)));
        let outcome = coordinator.request_sync(SyncPriority::User).await;

        match outcome {
            SyncRequest::Completed(result) => assert_eq!(result.priority, SyncPriority::User),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!coordinator.is_syncing());
        assert!(coordinator.status().last_result.is_some());
    }

    #[tokio::test]
    async fn overlapping_auto_requests_collapse() {
        let runner = Arc::new(GatedRunner::new(0));
        let coordinator = Arc::new(SyncCoordinator::new(runner.clone()));

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.request_sync(SyncPriority::Auto).await }
        });
        wait_until_running(&coordinator).await;

        for _ in 0..3 {
            assert_eq!(
                coordinator.request_sync(SyncPriority::Auto).await,
                SyncRequest::Queued(SyncPriority::Auto)
            );
        }
        assert_eq!(coordinator.status().pending_requests, 1);

        runner.gate.add_permits(10);
        assert!(matches!(first.await.unwrap(), SyncRequest::Completed(_)));
        assert_eq!(runner.calls(), vec![SyncPriority::Auto, SyncPriority::Auto]);
        assert!(!coordinator.is_syncing());
    }

    #[tokio::test]
    async fn user_upgrades_pending_auto() {
        let runner = Arc::new(GatedRunner::new(0));
        let coordinator = Arc::new(SyncCoordinator::new(runner.clone()));

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.request_sync(SyncPriority::Auto).await }
        });
        wait_until_running(&coordinator).await;

        coordinator.request_sync(SyncPriority::Auto).await;
        assert_eq!(
            coordinator.request_sync(SyncPriority::User).await,
            SyncRequest::Queued(SyncPriority::User)
        );
        // Auto never downgrades a waiting user request.
        assert_eq!(
            coordinator.request_sync(SyncPriority::Auto).await,
            SyncRequest::Queued(SyncPriority::User)
        );

        runner.gate.add_permits(10);
        first.await.unwrap();
        assert_eq!(runner.calls(), vec![SyncPriority::Auto, SyncPriority::User]);
        assert_eq!(
            coordinator.status().last_result.unwrap().priority,
            SyncPriority::User
        );
    }

    #[tokio::test]
    async fn cancel_pending_request() {
        let runner = Arc::new(GatedRunner::new(0));
        let coordinator = Arc::new(SyncCoordinator::new(runner.clone()));

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.request_sync(SyncPriority::User).await }
        });
        wait_until_running(&coordinator).await;

        coordinator.request_sync(SyncPriority::Auto).await;
        assert!(coordinator.cancel_pending());
        assert!(!coordinator.cancel_pending());
        assert!(coordinator.is_syncing());

        runner.gate.add_permits(10);
        first.await.unwrap();
        assert_eq!(runner.calls(), vec![SyncPriority::User]);
    }

    #[tokio::test]
    async fn dropped_request_leaves_coordinator_idle() {
        let runner = Arc::new(GatedRunner::new(0));
        let coordinator = Arc::new(SyncCoordinator::new(runner.clone()));

        let stuck = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.request_sync(SyncPriority::User).await }
        });
        wait_until_running(&coordinator).await;
        coordinator.request_sync(SyncPriority::Auto).await;

        stuck.abort();
        assert!(stuck.await.unwrap_err().is_cancelled());
        assert!(!coordinator.is_syncing());
        assert_eq!(coordinator.status().pending_requests, 0);

        runner.gate.add_permits(1);
        assert!(matches!(
            coordinator.request_sync(SyncPriority::User).await,
            SyncRequest::Completed(_)
        ));
        assert_eq!(
            runner.calls(),
            vec![SyncPriority::User, SyncPriority::User]
        );
    }
}
