//! Authentication support for the sync server.
//!
//! This module provides bearer tokens signed with HMAC-SHA256. Tokens carry
//! their own expiry.
//!
//! ## Token Format
//!
//! `<device>.<expires>.<signature>` where:
//! - `device` is the device ID, base64url without padding
//! - `expires` is the expiry in Unix seconds, decimal
//! - `signature` is HMAC-SHA256 over `<device>.<expires>`, base64url
//!   without padding

use crate::error::{ServerError, ServerResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(60 * 60), // 1 hour
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// What a verified token says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Device the token was issued to.
    pub device_id: String,
    /// Expiry (Unix seconds).
    pub expires_at: i64,
}

impl TokenClaims {
    /// Returns true if the token has expired at `now_secs`.
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        now_secs >= self.expires_at
    }
}

/// Issues and checks bearer tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Issues a token for `device_id`, valid from `now_secs`.
    ///
    /// Returns the token and its expiry in Unix seconds.
    pub fn create_token(&self, device_id: &str, now_secs: i64) -> ServerResult<(String, i64)> {
        let lifetime = i64::try_from(self.config.token_expiry.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now_secs.saturating_add(lifetime);

        let payload = format!("{}.{}", URL_SAFE_NO_PAD.encode(device_id), expires_at);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes())?);
        Ok((format!("{payload}.{signature}"), expires_at))
    }

    /// Verifies the signature and shape of `token` and returns its claims.
    ///
    /// Expiry is not checked here; see [`TokenValidator::validate_token`].
    pub fn verify_signature(&self, token: &str) -> ServerResult<TokenClaims> {
        let (payload, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| malformed("missing signature"))?;
        let (device, expires) = payload
            .split_once('.')
            .ok_or_else(|| malformed("missing expiry"))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| malformed("signature is not base64"))?;
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| ServerError::AuthenticationFailed("invalid signature".into()))?;

        let device_id = URL_SAFE_NO_PAD
            .decode(device)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| malformed("device is not valid base64 text"))?;
        let expires_at = expires
            .parse::<i64>()
            .map_err(|_| malformed("expiry is not a number"))?;

        Ok(TokenClaims {
            device_id,
            expires_at,
        })
    }

    /// Validates `token` at `now_secs`: signature and expiry.
    pub fn validate_token(&self, token: &str, now_secs: i64) -> ServerResult<TokenClaims> {
        let claims = self.verify_signature(token)?;
        if claims.is_expired_at(now_secs) {
            return Err(ServerError::AuthenticationFailed("token expired".into()));
        }
        Ok(claims)
    }

    fn mac(&self) -> ServerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("invalid auth secret: {e}")))
    }

    fn sign(&self, data: &[u8]) -> ServerResult<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("token_expiry", &self.config.token_expiry)
            .finish_non_exhaustive()
    }
}

fn malformed(reason: &str) -> ServerError {
    ServerError::AuthenticationFailed(format!("malformed token: {reason}"))
}
