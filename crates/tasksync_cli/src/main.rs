//! tasksync CLI
//!
//! Command-line client for tasksync.
//!
//! # Commands
//!
//! - `enable` / `disable` - Switch sync on or off for this installation
//! - `status` - Show sync state and queue size
//! - `add` / `edit` / `delete` - Change local tasks
//! - `queue` - List queued mutations
//! - `consolidate` - Collapse queued mutations per task
//! - `history` - Show recent sync cycles
//! - `sync` - Run a sync cycle against the server

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// tasksync command-line client.
#[derive(Parser)]
#[command(name = "tasksync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local sync store
    #[arg(global = true, short, long, default_value = "tasksync.json")]
    store: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn sync on with a token issued by the server
    Enable {
        /// Bearer token
        #[arg(short, long)]
        token: String,

        /// Token expiry (Unix seconds or milliseconds)
        #[arg(short, long)]
        expires_at: i64,
    },

    /// Turn sync off, keeping the device identity
    Disable,

    /// Show sync state
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Create a task
    Add {
        /// Task title
        title: String,

        /// Mark as urgent
        #[arg(short, long)]
        urgent: bool,

        /// Mark as important
        #[arg(short, long)]
        important: bool,
    },

    /// Change a task
    Edit {
        /// Task ID
        id: String,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        /// Mark as completed
        #[arg(short, long)]
        done: bool,
    },

    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },

    /// List local tasks
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List queued mutations
    Queue {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Collapse queued mutations so each task has at most one entry
    Consolidate,

    /// Show recent sync cycles
    History {
        /// Maximum number of entries
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a sync cycle
    Sync {
        /// Base URL of the sync server
        #[arg(long)]
        server: String,

        /// Run as a background (automatic) sync that honors backoff
        #[arg(long)]
        auto: bool,

        /// Collapse the queue before pushing
        #[arg(long)]
        consolidate: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = cli.store;
    match cli.command {
        Commands::Enable { token, expires_at } => {
            commands::setup::enable(&store, token, expires_at)?;
        }
        Commands::Disable => commands::setup::disable(&store)?,
        Commands::Status { format } => commands::status::run(&store, &format)?,
        Commands::Add {
            title,
            urgent,
            important,
        } => {
            commands::tasks::add(&store, title, urgent, important)?;
        }
        Commands::Edit { id, title, done } => {
            commands::tasks::edit(&store, &id, title, done)?;
        }
        Commands::Delete { id } => {
            commands::tasks::delete(&store, &id)?;
        }
        Commands::List { format } => commands::tasks::list(&store, &format)?,
        Commands::Queue { format } => commands::queue::list(&store, &format)?,
        Commands::Consolidate => {
            commands::queue::consolidate(&store)?;
        }
        Commands::History { limit, format } => commands::history::run(&store, limit, &format)?,
        Commands::Sync {
            server,
            auto,
            consolidate,
        } => commands::sync::run(&store, &server, auto, consolidate)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sync_flags() {
        let cli = Cli::parse_from([
            "tasksync",
            "--store",
            "/tmp/s.json",
            "sync",
            "--server",
            "https://sync.example.com",
            "--auto",
        ]);
        assert_eq!(cli.store, PathBuf::from("/tmp/s.json"));
        match cli.command {
            Commands::Sync {
                server,
                auto,
                consolidate,
            } => {
                assert_eq!(server, "https://sync.example.com");
                assert!(auto);
                assert!(!consolidate);
            }
            _ => panic!("expected sync"),
        }
    }
}
