//! History command implementation.

use super::{format_millis, local_context, CmdResult};
use std::path::Path;
use tasksync_engine::MetadataManager;

/// Runs the history command.
pub fn run(store: &Path, limit: usize, format: &str) -> CmdResult {
    let ctx = local_context(store)?;
    let history = MetadataManager::new(&ctx).history(limit)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&history)?),
        _ => {
            if history.is_empty() {
                println!("No sync cycles recorded");
            }
            for entry in &history {
                println!(
                    "{}  {:<8} {:<5} pushed {:>3}  pulled {:>3}  conflicts {:>2}  {}ms",
                    format_millis(Some(entry.timestamp)),
                    entry.status.to_string(),
                    entry.priority.to_string(),
                    entry.pushed_count,
                    entry.pulled_count,
                    entry.conflict_count,
                    entry.duration_ms
                );
                if let Some(message) = &entry.message {
                    println!("    {message}");
                }
            }
        }
    }
    Ok(())
}
