//! Request handlers for sync endpoints.

use crate::auth::{AuthConfig, TokenClaims, TokenValidator};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::tasklog::{ApplyOutcome, TaskLog};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tasksync_protocol::{
    PullRequest, PullResponse, PushRequest, PushResponse, TokenRefreshRequest,
    TokenRefreshResponse,
};
use tracing::{debug, info};

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Task state (shared across all handlers).
    pub log: Arc<TaskLog>,
    validator: Option<TokenValidator>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, log: Arc<TaskLog>) -> Self {
        let validator = config.auth_secret.as_ref().map(|secret| {
            TokenValidator::new(
                AuthConfig::new(secret.clone()).with_expiry(config.token_expiry),
            )
        });
        Self {
            config,
            log,
            validator,
        }
    }

    /// Returns the token validator, if a secret is configured.
    pub fn validator(&self) -> Option<&TokenValidator> {
        self.validator.as_ref()
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Checks the bearer token of a push or pull.
    ///
    /// Returns `None` when authentication is off.
    pub fn authenticate(
        &self,
        bearer: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServerResult<Option<TokenClaims>> {
        if !self.context.config.require_auth {
            return Ok(None);
        }
        let validator = self.validator()?;
        let token = bearer.ok_or_else(|| {
            ServerError::AuthenticationFailed("missing bearer token".into())
        })?;
        validator.validate_token(token, now.timestamp()).map(Some)
    }

    /// Handles a push request.
    pub fn handle_push(
        &self,
        request: PushRequest,
        caller: Option<&TokenClaims>,
        now: DateTime<Utc>,
    ) -> ServerResult<PushResponse> {
        check_device(&request.device_id, caller)?;
        let max = self.context.config.max_push_batch as usize;
        if request.operations.len() > max {
            return Err(ServerError::InvalidRequest(format!(
                "too many operations: {} > {}",
                request.operations.len(),
                max
            )));
        }

        let mut response = PushResponse::default();
        for op in &request.operations {
            match self.context.log.apply(&request.device_id, op, now) {
                ApplyOutcome::Accepted => response.accepted.push(op.task_id.clone()),
                ApplyOutcome::Rejected(rejected) => response.rejected.push(rejected),
                ApplyOutcome::Conflict(conflict) => response.conflicts.push(conflict),
            }
        }
        response.server_vector_clock = self.context.log.server_clock();

        debug!(
            device_id = %request.device_id,
            accepted = response.accepted.len(),
            rejected = response.rejected.len(),
            conflicts = response.conflicts.len(),
            "handled push"
        );
        Ok(response)
    }

    /// Handles a pull request.
    pub fn handle_pull(
        &self,
        request: PullRequest,
        caller: Option<&TokenClaims>,
    ) -> ServerResult<PullResponse> {
        check_device(&request.device_id, caller)?;
        let max = self.context.config.max_pull_batch;
        let limit = match request.limit {
            0 => max,
            limit => limit.min(max),
        };

        let page = self.context.log.changes_since(
            &request.device_id,
            request.since_timestamp,
            request.after_task_id.as_deref(),
            limit as usize,
        );

        debug!(
            device_id = %request.device_id,
            tasks = page.tasks.len(),
            deleted = page.deleted.len(),
            has_more = page.has_more,
            "handled pull"
        );
        Ok(PullResponse {
            tasks: page.tasks.iter().map(|t| t.to_remote()).collect(),
            deleted_task_ids: page.deleted,
            server_vector_clock: self.context.log.server_clock(),
            conflicts: Vec::new(),
            has_more: page.has_more,
        })
    }

    /// Handles a token refresh.
    ///
    /// An expired token may be refreshed as long as its signature holds and
    /// it was issued to the requesting device.
    pub fn handle_refresh(
        &self,
        request: TokenRefreshRequest,
        bearer: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServerResult<TokenRefreshResponse> {
        if self.context.config.require_auth {
            let token = bearer.ok_or_else(|| {
                ServerError::AuthenticationFailed("missing bearer token".into())
            })?;
            let claims = self.validator()?.verify_signature(token)?;
            check_device(&request.device_id, Some(&claims))?;
        }

        let (token, expires_at) = self.issue_token(&request.device_id, now)?;
        info!(device_id = %request.device_id, expires_at, "issued refreshed token");
        Ok(TokenRefreshResponse { token, expires_at })
    }

    /// Issues a token for `device_id`. Expiry is in Unix seconds.
    ///
    /// Without a secret the token is an unsigned placeholder.
    pub fn issue_token(&self, device_id: &str, now: DateTime<Utc>) -> ServerResult<(String, i64)> {
        if device_id.is_empty() {
            return Err(ServerError::InvalidRequest("empty device id".into()));
        }
        match &self.context.validator {
            Some(validator) => validator.create_token(device_id, now.timestamp()),
            None => {
                let lifetime =
                    i64::try_from(self.context.config.token_expiry.as_secs()).unwrap_or(i64::MAX);
                Ok((
                    format!("open.{device_id}"),
                    now.timestamp().saturating_add(lifetime),
                ))
            }
        }
    }

    fn validator(&self) -> ServerResult<&TokenValidator> {
        self.context
            .validator()
            .ok_or_else(|| ServerError::Internal("authentication required but no secret set".into()))
    }
}

fn check_device(device_id: &str, caller: Option<&TokenClaims>) -> ServerResult<()> {
    if device_id.is_empty() {
        return Err(ServerError::InvalidRequest("empty device id".into()));
    }
    match caller {
        Some(claims) if claims.device_id != device_id => Err(ServerError::NotAuthorized(format!(
            "token belongs to another device than {device_id}"
        ))),
        _ => Ok(()),
    }
}
