//! Fetching and applying remote changes.

use crate::context::SyncContext;
use crate::crypto::{decode_blob, CryptoProvider};
use crate::error::SyncResult;
use crate::transport::SyncApi;
use std::sync::Arc;
use tasksync_protocol::{
    ClockOrdering, Conflict, ConflictStrategy, PullRequest, PullResponse, RemoteTask, Resolution,
    TaskRecord, VectorClock,
};
use tasksync_store::{SyncConfig, SyncStore};
use tracing::{debug, info, warn};

/// What one pull achieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullOutcome {
    /// Remote tasks that decoded and were resolved against local state.
    pub tasks: Vec<TaskRecord>,
    /// Task IDs the server reported deleted.
    pub deleted_task_ids: Vec<String>,
    /// Server clock.
    pub server_vector_clock: VectorClock,
    /// Concurrent edits left for the user to resolve.
    pub conflicts: Vec<Conflict>,
    /// Remote task IDs that failed to decrypt or validate.
    pub skipped: Vec<String>,
}

/// Fetches remote changes and merges them into the local store.
#[derive(Clone)]
pub struct PullHandler {
    store: Arc<dyn SyncStore>,
    crypto: Arc<dyn CryptoProvider>,
    api: Arc<dyn SyncApi>,
    limit: u32,
}

impl PullHandler {
    /// Creates a pull handler.
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            store: Arc::clone(ctx.store()),
            crypto: Arc::clone(ctx.crypto()),
            api: Arc::clone(ctx.api()),
            limit: ctx.config().pull_limit,
        }
    }

    /// Pulls changes since the last successful cycle and applies them.
    ///
    /// Pages are requested until the server reports nothing more, each one
    /// resuming after the last task of the previous page. A record that
    /// fails to decrypt or validate is skipped; it never fails the pull.
    pub async fn pull(&self, config: &SyncConfig) -> SyncResult<PullOutcome> {
        let mut request = PullRequest {
            device_id: config.device_id.clone(),
            since_timestamp: config.last_sync_at,
            after_task_id: None,
            last_vector_clock: config.vector_clock.clone(),
            limit: self.limit,
        };
        let mut outcome = PullOutcome::default();
        let mut pages = 0usize;

        loop {
            let response = self.api.pull(&request).await?;
            pages += 1;
            debug!(
                page = pages,
                tasks = response.tasks.len(),
                deleted = response.deleted_task_ids.len(),
                has_more = response.has_more,
                "pull response"
            );

            let has_more = response.has_more;
            let cursor = response
                .tasks
                .last()
                .map(|t| (t.updated_at.timestamp_millis(), t.id.clone()));
            self.apply_page(response, config.conflict_strategy, &mut outcome)?;

            let Some((since, after)) = cursor.filter(|_| has_more) else {
                break;
            };
            if request.since_timestamp == Some(since)
                && request.after_task_id.as_deref() == Some(after.as_str())
            {
                warn!(since, after = %after, "pull cursor did not advance, stopping");
                break;
            }
            request.since_timestamp = Some(since);
            request.after_task_id = Some(after);
        }

        info!(
            pages,
            pulled = outcome.tasks.len(),
            deleted = outcome.deleted_task_ids.len(),
            skipped = outcome.skipped.len(),
            conflicts = outcome.conflicts.len(),
            "pull complete"
        );
        Ok(outcome)
    }

    fn apply_page(
        &self,
        response: PullResponse,
        strategy: ConflictStrategy,
        outcome: &mut PullOutcome,
    ) -> SyncResult<()> {
        outcome
            .server_vector_clock
            .merge(&response.server_vector_clock);

        for remote in &response.tasks {
            let task = match self.decode(remote) {
                Ok(task) => task,
                Err(e) => {
                    warn!(task_id = %remote.id, error = %e, "skipping undecodable remote task");
                    outcome.skipped.push(remote.id.clone());
                    continue;
                }
            };

            let remote_clock = task.vector_clock.merged(&remote.vector_clock);
            if let Some(conflict) = self.apply(&task, &remote_clock, strategy)? {
                outcome.conflicts.push(conflict);
            }
            outcome.tasks.push(task);
        }

        for task_id in response.deleted_task_ids {
            if outcome.deleted_task_ids.contains(&task_id) {
                continue;
            }
            if self.store.delete_task(&task_id)? {
                debug!(task_id = %task_id, "applied remote delete");
            }
            outcome.deleted_task_ids.push(task_id);
        }
        Ok(())
    }

    fn decode(&self, remote: &RemoteTask) -> SyncResult<TaskRecord> {
        let ciphertext = decode_blob(&remote.encrypted_blob)?;
        let nonce = decode_blob(&remote.nonce)?;
        let plaintext = self.crypto.decrypt(&ciphertext, &nonce)?;
        let task = TaskRecord::from_json_bytes(&plaintext)?;
        if task.id != remote.id {
            return Err(tasksync_protocol::ProtocolError::invalid_task(
                &remote.id,
                format!("payload carries id {}", task.id),
            )
            .into());
        }
        Ok(task)
    }

    /// Resolves one remote task against local state.
    ///
    /// Returns a conflict when the task was left for manual resolution.
    fn apply(
        &self,
        remote: &TaskRecord,
        remote_clock: &VectorClock,
        strategy: ConflictStrategy,
    ) -> SyncResult<Option<Conflict>> {
        let Some(local) = self.store.get_task(&remote.id)? else {
            let mut inserted = remote.clone();
            inserted.vector_clock = remote_clock.clone();
            self.store.put_task(&inserted)?;
            return Ok(None);
        };

        let merged_clock = local.vector_clock.merged(remote_clock);
        match strategy.resolve(&local, remote, remote_clock) {
            Resolution::Surface => {
                debug!(task_id = %remote.id, "concurrent edit left for manual resolution");
                Ok(Some(Conflict::between(&local, remote, remote_clock)))
            }
            Resolution::AcceptRemote => {
                if local.vector_clock.compare(remote_clock) == ClockOrdering::Concurrent {
                    debug!(task_id = %remote.id, "concurrent edit, remote wins by timestamp");
                }
                let mut winner = remote.clone();
                winner.vector_clock = merged_clock;
                self.store.put_task(&winner)?;
                Ok(None)
            }
            Resolution::KeepLocal => {
                if local.vector_clock.compare(remote_clock) == ClockOrdering::Concurrent {
                    debug!(task_id = %remote.id, "concurrent edit, local wins by timestamp");
                }
                let mut winner = local;
                winner.vector_clock = merged_clock;
                self.store.put_task(&winner)?;
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for PullHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullHandler")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}
