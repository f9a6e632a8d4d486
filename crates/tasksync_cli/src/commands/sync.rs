//! Sync command implementation.

use super::{format_duration, sync_context, CmdResult};
use std::path::Path;
use std::sync::Arc;
use tasksync_engine::{SyncCoordinator, SyncCycleResult, SyncEngine, SyncRequest};
use tasksync_store::{CycleStatus, SyncPriority};

/// Runs the sync command.
pub fn run(store: &Path, server_url: &str, auto: bool, consolidate: bool) -> CmdResult {
    let ctx = sync_context(store, server_url, consolidate)?;
    let priority = if auto {
        SyncPriority::Auto
    } else {
        SyncPriority::User
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let coordinator = SyncCoordinator::new(Arc::new(SyncEngine::new(ctx)));

    match runtime.block_on(coordinator.request_sync(priority)) {
        SyncRequest::Completed(result) => report(&result),
        SyncRequest::Queued(priority) => {
            println!("A sync is already running; queued as {priority}");
            Ok(())
        }
    }
}

fn report(result: &SyncCycleResult) -> CmdResult {
    println!("Sync {} in {}", result.status, format_duration(result.duration));
    println!("  Pushed:    {}", result.pushed_count);
    println!("  Pulled:    {}", result.pulled_count);
    if !result.conflicts.is_empty() {
        println!("  Conflicts: {}", result.conflicts.len());
        for conflict in &result.conflicts {
            println!("    {}", conflict.task_id);
        }
    }

    match (&result.status, &result.error) {
        (CycleStatus::Error, Some(message)) => Err(message.clone().into()),
        _ => Ok(()),
    }
}
