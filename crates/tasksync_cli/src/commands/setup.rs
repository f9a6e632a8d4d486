//! Enable and disable commands.

use super::{local_context, CmdResult};
use std::path::Path;
use tasksync_engine::MetadataManager;

/// Runs the enable command.
pub fn enable(store: &Path, token: String, expires_at: i64) -> CmdResult {
    let ctx = local_context(store)?;
    let metadata = MetadataManager::new(&ctx);
    let config = metadata.enable(token, expires_at)?;

    println!("Sync enabled");
    println!("  Device ID: {}", config.device_id);
    println!("  Queued:    {} mutation(s)", ctx.store().queue_len()?);
    Ok(())
}

/// Runs the disable command.
pub fn disable(store: &Path) -> CmdResult {
    let ctx = local_context(store)?;
    MetadataManager::new(&ctx).disable()?;
    println!("Sync disabled");
    Ok(())
}
