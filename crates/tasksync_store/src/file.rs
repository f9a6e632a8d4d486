//! File-backed store for persistent installations.

use crate::backend::{SyncStore, TaskEntryFold};
use crate::error::{StoreError, StoreResult};
use crate::state::{StoreState, FORMAT_VERSION};
use crate::types::{QueueEntry, SyncConfig, SyncHistoryEntry};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tasksync_protocol::TaskRecord;
use tracing::debug;

/// A file-backed store.
///
/// The whole store is one JSON document. Every write produces a complete
/// new document in a sibling temp file which is then renamed over the old
/// one, so a crash leaves either the old or the new state on disk.
///
/// # Locking
///
/// An exclusive advisory lock on `<path>.lock` is held for the lifetime of
/// the store. A second process opening the same path gets
/// [`StoreError::Locked`].
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use tasksync_store::{FileStore, SyncStore};
///
/// let store = FileStore::open(Path::new("sync.json")).unwrap();
/// println!("{} queued", store.queue_len().unwrap());
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: RwLock<StoreState>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held elsewhere, the file cannot be
    /// read, or its contents are not a store document.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(lock_path));
        }

        let state = if path.exists() {
            let bytes = fs::read(path)?;
            let state: StoreState = serde_json::from_slice(&bytes)?;
            if state.format_version > FORMAT_VERSION {
                return Err(StoreError::Corrupted(format!(
                    "unsupported format version {} (max {})",
                    state.format_version, FORMAT_VERSION
                )));
            }
            state
        } else {
            StoreState::default()
        };

        debug!(
            path = %path.display(),
            queued = state.queue.len(),
            tasks = state.tasks.len(),
            "opened file store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(state),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the store document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &StoreState) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Applies `f` to a copy of the state and commits it only if the write
    /// reaches disk.
    fn mutate<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> StoreResult<R> {
        let mut state = self.state.write();
        let mut next = state.clone();
        let result = f(&mut next);
        self.persist(&next)?;
        *state = next;
        Ok(result)
    }
}

impl SyncStore for FileStore {
    fn load_config(&self) -> StoreResult<Option<SyncConfig>> {
        Ok(self.state.read().config.clone())
    }

    fn save_config(&self, config: &SyncConfig) -> StoreResult<()> {
        self.mutate(|s| s.config = Some(config.clone()))
    }

    fn append_entry(&self, entry: QueueEntry) -> StoreResult<()> {
        self.mutate(|s| s.queue.push(entry))
    }

    fn queue_entries(&self) -> StoreResult<Vec<QueueEntry>> {
        Ok(self.state.read().queue.clone())
    }

    fn queue_len(&self) -> StoreResult<usize> {
        Ok(self.state.read().queue.len())
    }

    fn remove_task_entries(&self, task_id: &str) -> StoreResult<usize> {
        self.mutate(|s| s.remove_task_entries(task_id))
    }

    fn fold_task_entries(&self, task_id: &str, fold: &TaskEntryFold) -> StoreResult<usize> {
        self.mutate(|s| s.fold_task_entries(task_id, fold))
    }

    fn increment_retry(&self, task_id: &str) -> StoreResult<usize> {
        self.mutate(|s| s.increment_retry(task_id))
    }

    fn clear_queue(&self) -> StoreResult<usize> {
        self.mutate(|s| {
            let removed = s.queue.len();
            s.queue.clear();
            removed
        })
    }

    fn get_task(&self, task_id: &str) -> StoreResult<Option<TaskRecord>> {
        Ok(self.state.read().tasks.get(task_id).cloned())
    }

    fn put_task(&self, task: &TaskRecord) -> StoreResult<()> {
        self.mutate(|s| {
            s.tasks.insert(task.id.clone(), task.clone());
        })
    }

    fn delete_task(&self, task_id: &str) -> StoreResult<bool> {
        if !self.state.read().tasks.contains_key(task_id) {
            return Ok(false);
        }
        self.mutate(|s| s.tasks.remove(task_id).is_some())
    }

    fn all_tasks(&self) -> StoreResult<Vec<TaskRecord>> {
        Ok(self.state.read().tasks.values().cloned().collect())
    }

    fn append_history(&self, entry: SyncHistoryEntry, capacity: usize) -> StoreResult<()> {
        self.mutate(|s| s.append_history(entry, capacity))
    }

    fn history(&self, limit: usize) -> StoreResult<Vec<SyncHistoryEntry>> {
        Ok(self.state.read().history(limit))
    }
}
