//! Configuration for the sync engine.

use std::time::Duration;
use tasksync_protocol::DEFAULT_PULL_LIMIT;

/// Default number of history lines kept by the store.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Static configuration for the engine.
///
/// This is the part of the configuration that comes from the application;
/// the per-installation state (device ID, token, clock, backoff) lives in the
/// persisted [`tasksync_store::SyncConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Server URL.
    pub server_url: String,
    /// Maximum number of records requested per pull.
    pub pull_limit: u32,
    /// Refresh the token when it expires within this window.
    pub token_refresh_window: Duration,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Consolidate the queue before every push.
    pub consolidate_before_push: bool,
    /// Number of history lines to keep.
    pub history_capacity: usize,
    /// Request timeout.
    pub request_timeout: Duration,
}

impl EngineConfig {
    /// Creates a new engine configuration.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            pull_limit: DEFAULT_PULL_LIMIT,
            token_refresh_window: Duration::from_secs(5 * 60),
            retry: RetryConfig::default(),
            consolidate_before_push: false,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the pull limit.
    pub fn with_pull_limit(mut self, limit: u32) -> Self {
        self.pull_limit = limit;
        self
    }

    /// Sets the token refresh window.
    pub fn with_token_refresh_window(mut self, window: Duration) -> Self {
        self.token_refresh_window = window;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enables or disables consolidation before push.
    pub fn with_consolidate_before_push(mut self, enabled: bool) -> Self {
        self.consolidate_before_push = enabled;
        self
    }

    /// Sets the history capacity.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Configuration for retry behavior after transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the 1st, 2nd, ... consecutive failure.
    pub delays: Vec<Duration>,
    /// Delay once the table runs out, and the upper bound for every delay.
    pub max_delay: Duration,
    /// Automatic retries stop after this many consecutive failures.
    pub max_consecutive_failures: u32,
}

impl RetryConfig {
    /// Creates a retry configuration from a delay table.
    pub fn new(delays: Vec<Duration>, max_delay: Duration) -> Self {
        Self {
            delays,
            max_delay,
            max_consecutive_failures: 5,
        }
    }

    /// Sets the failure limit.
    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    /// Calculates the delay after `failures` consecutive failures (1-indexed).
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let delay = self
            .delays
            .get(failures as usize - 1)
            .copied()
            .unwrap_or(self.max_delay);

        delay.min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
            Duration::from_secs(300),
        )
    }
}
