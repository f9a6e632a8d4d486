//! Status command implementation.

use super::{format_millis, local_context, CmdResult};
use serde::Serialize;
use std::path::Path;
use tasksync_engine::{MetadataManager, RetryManager};

/// Sync state of this installation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Whether sync is on.
    pub enabled: bool,
    /// Device ID, once sync was enabled.
    pub device_id: Option<String>,
    /// Start of the last successful cycle (ms).
    pub last_sync_at: Option<i64>,
    /// Queued mutations.
    pub pending_count: usize,
    /// Transient failures since the last success.
    pub consecutive_failures: u32,
    /// Earliest automatic retry (ms).
    pub next_retry_at: Option<i64>,
    /// Last failure message.
    pub last_failure_reason: Option<String>,
}

/// Collects the status report.
pub fn report(store: &Path) -> CmdResult<StatusReport> {
    let ctx = local_context(store)?;
    let metadata = MetadataManager::new(&ctx);
    let status = metadata.get_status(false)?;

    let mut report = StatusReport {
        enabled: status.enabled,
        device_id: None,
        last_sync_at: status.last_sync_at,
        pending_count: status.pending_count,
        consecutive_failures: 0,
        next_retry_at: None,
        last_failure_reason: None,
    };
    if let Some(config) = metadata.get_sync_config()? {
        report.device_id = Some(config.device_id);
        let retry = RetryManager::new(&ctx).retry_status()?;
        report.consecutive_failures = retry.consecutive_failures;
        report.next_retry_at = retry.next_retry_at;
        report.last_failure_reason = retry.last_failure_reason;
    }
    Ok(report)
}

/// Runs the status command.
pub fn run(store: &Path, format: &str) -> CmdResult {
    let report = report(store)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text_output(&report),
    }
    Ok(())
}

fn print_text_output(report: &StatusReport) {
    println!("Sync Status");
    println!("===========");
    println!("  Enabled:       {}", report.enabled);
    println!(
        "  Device ID:     {}",
        report.device_id.as_deref().unwrap_or("(not configured)")
    );
    println!("  Last sync:     {}", format_millis(report.last_sync_at));
    println!("  Pending:       {}", report.pending_count);
    if report.consecutive_failures > 0 {
        println!("  Failures:      {}", report.consecutive_failures);
        println!("  Next retry:    {}", format_millis(report.next_retry_at));
        if let Some(reason) = &report.last_failure_reason {
            println!("  Last error:    {reason}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_store_reports_unconfigured() {
        let dir = tempdir().unwrap();
        let report = report(&dir.path().join("store.json")).unwrap();
        assert!(!report.enabled);
        assert!(report.device_id.is_none());
        assert_eq!(report.pending_count, 0);
    }
}
