//! CLI argument parsing with clap derive macros.

use std::path::PathBuf;

use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand};

use muxgeist_core::aggregate::DEFAULT_SELF_TITLE;
use muxgeist_core::buffer::DEFAULT_CONTEXT_CAPACITY;
use muxgeist_core::registry::DEFAULT_MAX_SESSIONS;

/// Upper bound for `--max-sessions`; the registry is allocated up front.
pub const MAX_SESSIONS_LIMIT: usize = 4096;

/// Upper bound for `--buffer-capacity` (64 MiB).
pub const BUFFER_CAPACITY_LIMIT: usize = 64 * 1024 * 1024;

/// Session-context daemon for tmux.
///
/// The daemon polls every tmux session, keeps a bounded snapshot of what is
/// visible in its panes, and answers queries over a Unix socket. The other
/// commands are one-shot clients of that socket.
#[derive(Debug, Parser)]
#[command(name = "muxgeist", version)]
pub struct Cli {
    /// Daemon socket path [env: MUXGEIST_SOCKET] [default: /tmp/muxgeist.sock]
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show how many sessions the daemon tracks
    Status,

    /// List tracked sessions with their working directories
    List,

    /// Print the captured context of a session
    #[command(after_help = "\
Examples:
  muxgeist context dev                  # Raw context block
  muxgeist context dev --json           # Metadata and per-pane sections as JSON")]
    Context(ContextArgs),

    /// Run the daemon in the foreground
    Daemon(DaemonArgs),
}

#[derive(Debug, clap::Args)]
pub struct ContextArgs {
    /// tmux session name
    pub session: String,

    /// Parse the context block and print it as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct DaemonArgs {
    /// Time between refreshes of all sessions, in milliseconds
    #[arg(long, default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_ms: u64,

    /// Maximum number of tracked sessions
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_SESSIONS,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=MAX_SESSIONS_LIMIT as u64)
    )]
    pub max_sessions: usize,

    /// Context buffer size per session, in bytes
    #[arg(
        long,
        default_value_t = DEFAULT_CONTEXT_CAPACITY,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=BUFFER_CAPACITY_LIMIT as u64)
    )]
    pub buffer_capacity: usize,

    /// Timeout for a single tmux command, in milliseconds
    #[arg(long, default_value_t = 5000, value_parser = clap::value_parser!(u64).range(1..))]
    pub command_timeout_ms: u64,

    /// Panes whose title contains this are never captured (empty disables)
    #[arg(long, default_value = DEFAULT_SELF_TITLE)]
    pub self_title: String,

    /// tmux executable
    #[arg(long, default_value = "tmux")]
    pub tmux: String,
}
