//! # tasksync Protocol
//!
//! Causal-order primitives, task records and wire messages for tasksync.
//!
//! This crate provides:
//! - [`VectorClock`] for stamping mutations and merging causal state
//! - [`TaskRecord`], the whole-record snapshot replicated between devices
//! - Protocol messages (Push, Pull, token refresh) in their JSON wire shape
//! - [`Conflict`] and [`ConflictStrategy`] for surfacing concurrent edits
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod conflict;
mod error;
mod messages;
mod operation;
mod task;

pub use clock::{ClockOrdering, VectorClock};
pub use conflict::{Conflict, ConflictStrategy, Resolution};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    decode, encode, PullRequest, PullResponse, PushOperation, PushRequest, PushResponse,
    RejectedOperation, RemoteTask, TokenRefreshRequest, TokenRefreshResponse, DEFAULT_PULL_LIMIT,
};
pub use operation::OperationType;
pub use task::{Subtask, TaskRecord, MAX_TITLE_LEN};
