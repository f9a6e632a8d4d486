//! Sending queued mutations to the server.

use crate::context::SyncContext;
use crate::crypto::{encode_blob, CryptoProvider};
use crate::error::SyncResult;
use crate::queue::SyncQueue;
use crate::transport::SyncApi;
use std::sync::Arc;
use tasksync_protocol::{
    Conflict, PushOperation, PushRequest, PushResponse, RejectedOperation, VectorClock,
};
use tasksync_store::{QueueEntry, SyncConfig};
use tracing::{debug, info, warn};

/// What one push achieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushOutcome {
    /// Tasks the server accepted.
    pub accepted: Vec<String>,
    /// Operations the server refused; their entries stay queued.
    pub rejected: Vec<RejectedOperation>,
    /// Conflicts reported by the server; their entries were dropped.
    pub conflicts: Vec<Conflict>,
    /// Server clock, if a request was sent.
    pub server_vector_clock: Option<VectorClock>,
    /// Entries left out of the batch because they could not be encoded.
    pub skipped: Vec<String>,
}

/// Builds and sends the push batch and reconciles the queue with the reply.
#[derive(Clone)]
pub struct PushHandler {
    queue: SyncQueue,
    crypto: Arc<dyn CryptoProvider>,
    api: Arc<dyn SyncApi>,
}

impl PushHandler {
    /// Creates a push handler.
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            queue: SyncQueue::new(ctx),
            crypto: Arc::clone(ctx.crypto()),
            api: Arc::clone(ctx.api()),
        }
    }

    /// Pushes every pending entry in one batch.
    ///
    /// An empty queue returns immediately without touching the network. If
    /// the request fails the queue is left exactly as it was.
    pub async fn push(&self, config: &SyncConfig) -> SyncResult<PushOutcome> {
        let entries = self.queue.pending()?;
        if entries.is_empty() {
            debug!("nothing to push");
            return Ok(PushOutcome::default());
        }

        let mut operations = Vec::with_capacity(entries.len());
        let mut skipped = Vec::new();
        for entry in &entries {
            match self.build_operation(entry) {
                Ok(op) => operations.push(op),
                Err(e) => {
                    warn!(
                        task_id = %entry.task_id,
                        entry_id = %entry.id,
                        error = %e,
                        "skipping queue entry"
                    );
                    skipped.push(entry.id.clone());
                }
            }
        }

        if operations.is_empty() {
            return Ok(PushOutcome {
                skipped,
                ..PushOutcome::default()
            });
        }

        let request = PushRequest {
            device_id: config.device_id.clone(),
            client_vector_clock: config.vector_clock.clone(),
            operations,
        };
        debug!(operations = request.operations.len(), "pushing batch");

        let response = self.api.push(&request).await?;
        let mut outcome = self.reconcile(response)?;
        outcome.skipped = skipped;

        info!(
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected.len(),
            conflicts = outcome.conflicts.len(),
            "push complete"
        );
        Ok(outcome)
    }

    fn build_operation(&self, entry: &QueueEntry) -> SyncResult<PushOperation> {
        if entry.operation.is_delete() {
            return Ok(PushOperation::delete(
                entry.task_id.clone(),
                entry.vector_clock.clone(),
            ));
        }

        let payload = entry.payload.as_ref().ok_or_else(|| {
            tasksync_protocol::ProtocolError::invalid_task(&entry.task_id, "missing payload")
        })?;
        let plaintext = payload.to_json_bytes()?;
        let sealed = self.crypto.encrypt(&plaintext)?;

        Ok(PushOperation {
            op_type: entry.operation,
            task_id: entry.task_id.clone(),
            vector_clock: entry.vector_clock.clone(),
            encrypted_blob: Some(encode_blob(&sealed.ciphertext)),
            nonce: Some(encode_blob(&sealed.nonce)),
            checksum: Some(self.crypto.hash(&plaintext)),
        })
    }

    fn reconcile(&self, response: PushResponse) -> SyncResult<PushOutcome> {
        for task_id in &response.accepted {
            self.queue.remove_task(task_id)?;
        }

        for rejected in &response.rejected {
            warn!(
                task_id = %rejected.task_id,
                reason = %rejected.reason,
                details = rejected.details.as_deref().unwrap_or(""),
                "server rejected operation"
            );
            self.queue.increment_retry(&rejected.task_id)?;
        }

        for conflict in &response.conflicts {
            warn!(task_id = %conflict.task_id, "server reported conflict");
            self.queue.remove_task(&conflict.task_id)?;
        }

        Ok(PushOutcome {
            accepted: response.accepted,
            rejected: response.rejected,
            conflicts: response.conflicts,
            server_vector_clock: Some(response.server_vector_clock),
            skipped: Vec::new(),
        })
    }
}

impl std::fmt::Debug for PushHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushHandler").finish_non_exhaustive()
    }
}
