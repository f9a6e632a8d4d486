//! CLI command implementations.

pub mod history;
pub mod queue;
pub mod setup;
pub mod status;
pub mod sync;
pub mod tasks;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tasksync_engine::{
    AesGcmCrypto, CryptoProvider, EncryptionKey, EngineConfig, HttpTransport, ReqwestClient,
    SyncContext,
};
use tasksync_store::FileStore;

/// Result type shared by all commands.
pub type CmdResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Environment variable holding the encryption passphrase.
pub const PASSPHRASE_VAR: &str = "TASKSYNC_PASSPHRASE";
/// Environment variable holding the key-derivation salt (the account name).
pub const ACCOUNT_VAR: &str = "TASKSYNC_ACCOUNT";

/// Opens the store for commands that never talk to the server.
///
/// Local commands never encrypt, so a throwaway key stands in for the
/// passphrase-derived one.
pub fn local_context(store: &Path) -> CmdResult<SyncContext> {
    let crypto = AesGcmCrypto::new(EncryptionKey::generate());
    context(store, Arc::new(crypto), EngineConfig::default())
}

/// Opens the store and derives the payload key for a sync against `server_url`.
pub fn sync_context(store: &Path, server_url: &str, consolidate: bool) -> CmdResult<SyncContext> {
    let passphrase = std::env::var(PASSPHRASE_VAR)
        .map_err(|_| format!("{PASSPHRASE_VAR} must be set to sync"))?;
    let account = std::env::var(ACCOUNT_VAR).unwrap_or_else(|_| "tasksync".to_string());
    let crypto = AesGcmCrypto::from_secret(passphrase.as_bytes(), account.as_bytes())?;

    let config = EngineConfig::new(server_url).with_consolidate_before_push(consolidate);
    context(store, Arc::new(crypto), config)
}

fn context(
    store: &Path,
    crypto: Arc<dyn CryptoProvider>,
    config: EngineConfig,
) -> CmdResult<SyncContext> {
    let store = FileStore::open(store)?;
    let client = ReqwestClient::new(config.request_timeout)?;
    let transport = HttpTransport::new(config.server_url.clone(), client);
    Ok(SyncContext::new(
        Arc::new(store),
        crypto,
        Arc::new(transport),
        config,
    ))
}

/// Formats a Unix-millis timestamp for text output.
pub fn format_millis(ms: Option<i64>) -> String {
    ms.and_then(chrono::DateTime::from_timestamp_millis)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// Formats a duration for text output.
pub fn format_duration(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_formatting() {
        assert_eq!(format_millis(None), "never");
        assert_eq!(
            format_millis(Some(1_700_000_000_000)),
            "2023-11-14 22:13:20 UTC"
        );
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
    }
}
