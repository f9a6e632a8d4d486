//! # tasksync Engine
//!
//! Client-side sync engine for tasksync.
//!
//! This crate provides:
//! - A durable outbound queue with per-task consolidation
//! - Encrypted batch push and pull with per-record failure isolation
//! - Last-write-wins merging with vector clock bookkeeping
//! - Retry with a fixed backoff schedule
//! - Bearer token refresh
//! - A single-flight coordinator with priority deduplication
//! - HTTP transport abstraction
//!
//! ## Architecture
//!
//! Every component receives its dependencies through one [`SyncContext`]
//! (store, crypto provider, API client, [`EngineConfig`]). A cycle runs:
//! 1. Ensure a valid token
//! 2. Push queued mutations
//! 3. Pull and merge remote changes
//! 4. Record `lastSyncAt` and the merged vector clock
//!
//! ## Key Invariants
//!
//! - Queue entries leave only on acceptance, conflict or consolidation
//! - A failed request leaves the queue untouched
//! - One undecodable record never fails a push or a pull
//! - Only transient errors count towards backoff
//! - At most one cycle in flight, at most one waiting

#![deny(unsafe_code)]
#![warn(missing_docs)]

#[cfg(feature = "http")]
mod client;
mod config;
mod context;
mod coordinator;
mod crypto;
mod engine;
mod error;
mod http;
mod metadata;
mod mutation;
mod pull;
mod push;
mod queue;
mod retry;
mod token;
mod transport;

#[cfg(test)]
mod test_support;

#[cfg(feature = "http")]
pub use client::ReqwestClient;
pub use config::{EngineConfig, RetryConfig, DEFAULT_HISTORY_CAPACITY};
pub use context::SyncContext;
pub use coordinator::{CoordinatorStatus, CycleRunner, SyncCoordinator, SyncRequest};
pub use crypto::{
    decode_blob, encode_blob, AesGcmCrypto, CryptoProvider, EncryptedPayload, EncryptionKey,
    KEY_SIZE, NONCE_SIZE,
};
pub use engine::{SyncCycleResult, SyncEngine, SyncPhase, SyncStats};
pub use error::{ErrorCategory, SyncError, SyncResult};
pub use http::{
    classify_status, ErrorBody, HttpClient, HttpResponse, HttpTransport, LoopbackClient,
    LoopbackServer, PULL_PATH, PUSH_PATH, REFRESH_PATH,
};
pub use metadata::{MetadataManager, SyncStatus};
pub use mutation::MutationRecorder;
pub use pull::{PullHandler, PullOutcome};
pub use push::{PushHandler, PushOutcome};
pub use queue::{consolidate_entries, SyncQueue};
pub use retry::{RetryManager, RetryStatus};
pub use token::{normalize_expiry, TokenManager, EXPIRY_SECONDS_THRESHOLD};
pub use transport::{MockApi, SyncApi};
