//! Entry point for local task changes.

use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::queue::SyncQueue;
use std::sync::Arc;
use tasksync_protocol::{OperationType, TaskRecord, VectorClock};
use tasksync_store::{SyncConfig, SyncStore};
use tracing::debug;

/// Commits local task changes and queues them for sync.
///
/// Every change bumps this device's component of the task clock and is
/// written to the store. While sync is enabled it is queued; while sync is
/// switched off the task is remembered so re-enabling can queue it. Before
/// sync has ever been configured there is no device ID and clocks are left
/// alone.
#[derive(Clone)]
pub struct MutationRecorder {
    store: Arc<dyn SyncStore>,
    queue: SyncQueue,
}

impl MutationRecorder {
    /// Creates a recorder.
    pub fn new(ctx: &SyncContext) -> Self {
        Self {
            store: Arc::clone(ctx.store()),
            queue: SyncQueue::new(ctx),
        }
    }

    /// Records a new task.
    pub fn create(&self, task: TaskRecord) -> SyncResult<TaskRecord> {
        self.record(OperationType::Create, task)
    }

    /// Records a modified task.
    ///
    /// The stored clock is the starting point, so callers may pass a record
    /// built without one.
    pub fn update(&self, mut task: TaskRecord) -> SyncResult<TaskRecord> {
        if let Some(existing) = self.store.get_task(&task.id)? {
            task.vector_clock.merge(&existing.vector_clock);
        }
        self.record(OperationType::Update, task)
    }

    /// Deletes a task. Returns whether it existed locally.
    pub fn delete(&self, task_id: &str) -> SyncResult<bool> {
        let config = self.store.load_config()?;
        let existing = self.store.get_task(task_id)?;
        let clock = bump(
            existing
                .as_ref()
                .map(|t| t.vector_clock.clone())
                .unwrap_or_default(),
            config.as_ref(),
        );

        let existed = self.store.delete_task(task_id)?;
        self.track(config, OperationType::Delete, task_id, None, clock)?;
        debug!(task_id, existed, "recorded local delete");
        Ok(existed)
    }

    fn record(&self, operation: OperationType, mut task: TaskRecord) -> SyncResult<TaskRecord> {
        task.validate()?;

        let config = self.store.load_config()?;
        task.vector_clock = bump(task.vector_clock, config.as_ref());
        self.store.put_task(&task)?;

        self.track(
            config,
            operation,
            &task.id,
            Some(task.clone()),
            task.vector_clock.clone(),
        )?;
        debug!(task_id = %task.id, operation = %operation, "recorded local change");
        Ok(task)
    }

    fn track(
        &self,
        config: Option<SyncConfig>,
        operation: OperationType,
        task_id: &str,
        payload: Option<TaskRecord>,
        clock: VectorClock,
    ) -> SyncResult<()> {
        match config {
            Some(config) if config.enabled => {
                self.queue.enqueue(operation, task_id, payload, clock)?;
            }
            Some(mut config) => {
                config
                    .changed_while_disabled
                    .insert(task_id.to_string(), clock);
                self.store.save_config(&config)?;
            }
            None => {}
        }
        Ok(())
    }
}

fn bump(clock: VectorClock, config: Option<&SyncConfig>) -> VectorClock {
    match config {
        Some(config) => clock.incremented(&config.device_id),
        None => clock,
    }
}

impl std::fmt::Debug for MutationRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationRecorder").finish_non_exhaustive()
    }
}
