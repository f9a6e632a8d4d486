//! Bearer token lifecycle.

use crate::context::{now_millis, SyncContext};
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncApi;
use std::sync::Arc;
use std::time::Duration;
use tasksync_protocol::TokenRefreshRequest;
use tasksync_store::{SyncConfig, SyncStore};
use tracing::{debug, info, warn};

/// Expiry values below this are seconds, not milliseconds.
pub const EXPIRY_SECONDS_THRESHOLD: i64 = 10_000_000_000;

/// Converts a server-supplied expiry to milliseconds.
pub fn normalize_expiry(expires_at: i64) -> i64 {
    if expires_at < EXPIRY_SECONDS_THRESHOLD {
        expires_at.saturating_mul(1000)
    } else {
        expires_at
    }
}

/// Keeps the API client's bearer token fresh.
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn SyncStore>,
    api: Arc<dyn SyncApi>,
    refresh_window: Duration,
}

impl TokenManager {
    /// Creates a token manager.
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            store: Arc::clone(ctx.store()),
            api: Arc::clone(ctx.api()),
            refresh_window: ctx.config().token_refresh_window,
        }
    }

    /// Returns true if sync is enabled and the token expires soon.
    ///
    /// A missing expiry counts as expiring.
    pub fn needs_refresh(&self) -> SyncResult<bool> {
        self.needs_refresh_at(now_millis())
    }

    /// Like [`needs_refresh`](Self::needs_refresh) at a given time.
    pub fn needs_refresh_at(&self, now: i64) -> SyncResult<bool> {
        let Some(config) = self.store.load_config()? else {
            return Ok(false);
        };
        if !config.enabled {
            return Ok(false);
        }
        Ok(self.expiring(&config, now))
    }

    /// Milliseconds until the token expires, if an expiry is known.
    pub fn time_until_expiry(&self) -> SyncResult<Option<i64>> {
        Ok(self
            .store
            .load_config()?
            .and_then(|c| c.token_expires_at)
            .map(|at| at - now_millis()))
    }

    /// Makes sure the API client holds a usable token.
    ///
    /// Returns `Ok(true)` if the token was already valid or was refreshed,
    /// and `Ok(false)` if a refresh was needed but failed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if sync was never configured or no
    /// token is stored.
    pub async fn ensure_valid_token(&self) -> SyncResult<bool> {
        let config = self
            .store
            .load_config()?
            .ok_or_else(|| SyncError::config("sync config not initialized"))?;
        let Some(token) = config.token.clone() else {
            return Err(SyncError::config("no sync token stored"));
        };

        if !self.expiring(&config, now_millis()) {
            self.api.set_token(Some(token));
            return Ok(true);
        }

        debug!("token expires soon, refreshing");
        match self.refresh(config).await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                Ok(false)
            }
        }
    }

    /// Reacts to a 401/403 by refreshing the token.
    ///
    /// Returns whether the refresh succeeded.
    pub async fn handle_unauthorized(&self) -> bool {
        let config = match self.store.load_config() {
            Ok(Some(config)) => config,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "cannot load config for token refresh");
                return false;
            }
        };

        match self.refresh(config).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "token refresh after unauthorized response failed");
                false
            }
        }
    }

    fn expiring(&self, config: &SyncConfig, now: i64) -> bool {
        let window = i64::try_from(self.refresh_window.as_millis()).unwrap_or(i64::MAX);
        config
            .token_expires_at
            .map_or(true, |at| at.saturating_sub(now) < window)
    }

    async fn refresh(&self, mut config: SyncConfig) -> SyncResult<()> {
        self.api.set_token(config.token.clone());

        let request = TokenRefreshRequest {
            device_id: config.device_id.clone(),
        };
        let response = self.api.refresh_token(&request).await?;
        let expires_at = normalize_expiry(response.expires_at);

        // Reload so that writes made while the request was in flight survive.
        if let Some(latest) = self.store.load_config()? {
            config = latest;
        }
        config.token = Some(response.token.clone());
        config.token_expires_at = Some(expires_at);
        self.store.save_config(&config)?;

        self.api.set_token(Some(response.token));
        info!(expires_at, "sync token refreshed");
        Ok(())
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("refresh_window", &self.refresh_window)
            .finish_non_exhaustive()
    }
}
