//! Queue inspection and consolidation.

use super::{format_millis, local_context, CmdResult};
use std::path::Path;
use tasksync_engine::SyncQueue;

/// Runs the queue command.
pub fn list(store: &Path, format: &str) -> CmdResult {
    let ctx = local_context(store)?;
    let entries = SyncQueue::new(&ctx).pending()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            println!("{:<8} {:<38} {:>7}  Queued at", "Op", "Task", "Retries");
            for entry in &entries {
                println!(
                    "{:<8} {:<38} {:>7}  {}",
                    entry.operation.to_string(),
                    entry.task_id,
                    entry.retry_count,
                    format_millis(Some(entry.timestamp))
                );
            }
            println!("{} queued mutation(s)", entries.len());
        }
    }
    Ok(())
}

/// Runs the consolidate command.
pub fn consolidate(store: &Path) -> CmdResult<usize> {
    let ctx = local_context(store)?;
    let queue = SyncQueue::new(&ctx);
    let before = queue.pending_count()?;
    let removed = queue.consolidate_all()?;

    println!("Consolidated {before} mutation(s) into {}", before - removed);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{setup, tasks};
    use tempfile::tempdir;

    #[test]
    fn consolidate_collapses_per_task() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        setup::enable(&path, "tok".into(), 1_900_000_000).unwrap();

        let task = tasks::add(&path, "One".into(), false, false).unwrap();
        tasks::edit(&path, &task.id, Some("One!".into()), false).unwrap();
        tasks::edit(&path, &task.id, None, true).unwrap();
        tasks::add(&path, "Two".into(), false, false).unwrap();

        assert_eq!(consolidate(&path).unwrap(), 2);
        let ctx = local_context(&path).unwrap();
        assert_eq!(ctx.store().queue_len().unwrap(), 2);
    }
}
