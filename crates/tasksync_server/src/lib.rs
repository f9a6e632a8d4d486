//! # tasksync Server
//!
//! In-memory reference sync server for tasksync.
//!
//! This crate provides:
//! - Request handling for the push, pull and token refresh endpoints
//! - A task log holding the latest encrypted version of every task
//! - Authentication (HMAC-SHA256 bearer tokens with expiry)
//! - Conflict detection by vector clock comparison
//!
//! # Architecture
//!
//! The server never sees plaintext. It stores the opaque blob each device
//! pushed together with the clock it was pushed with, and decides between
//! versions purely by comparing clocks. It is transport agnostic:
//! [`SyncServer::handle_post`] takes a path, an optional bearer token and a
//! JSON body and returns a status code and a JSON body, so the same server
//! can sit behind an HTTP listener or be driven in-process by tests.
//!
//! # Authentication
//!
//! ```rust
//! use tasksync_server::{ServerConfig, SyncServer};
//!
//! let config = ServerConfig::default().with_auth(b"a-long-shared-secret".to_vec());
//! let server = SyncServer::new(config);
//! let (token, expires_at) = server.issue_token("device-1").unwrap();
//! assert!(!token.is_empty());
//! assert!(expires_at > 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod server;
mod tasklog;

pub use auth::{AuthConfig, TokenClaims, TokenValidator};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::{ServerReply, SyncServer, PULL_PATH, PUSH_PATH, REFRESH_PATH};
pub use tasklog::{ApplyOutcome, ChangePage, StoredTask, TaskLog, Tombstone};
