//! # tasksync Store
//!
//! Persistence for the sync engine.
//!
//! The store holds four things and nothing else:
//! - the singleton [`SyncConfig`] (one per installation, never duplicated)
//! - the ordered outbound queue of [`QueueEntry`] mutations
//! - the local [`TaskRecord`](tasksync_protocol::TaskRecord) snapshots
//! - a bounded log of [`SyncHistoryEntry`] cycle outcomes
//!
//! ## Available Backends
//!
//! - [`MemoryStore`] - For testing and ephemeral installations
//! - [`FileStore`] - A single JSON document rewritten atomically on every change
//!
//! ## Example
//!
//! ```rust
//! use tasksync_protocol::{OperationType, VectorClock};
//! use tasksync_store::{MemoryStore, QueueEntry, SyncStore};
//!
//! let store = MemoryStore::new();
//! store
//!     .append_entry(QueueEntry::new(OperationType::Delete, "t1", None, VectorClock::new(), 0))
//!     .unwrap();
//! assert_eq!(store.queue_len().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod state;
mod types;

pub use backend::{SyncStore, TaskEntryFold};
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use types::{CycleStatus, QueueEntry, SyncConfig, SyncHistoryEntry, SyncPriority};
