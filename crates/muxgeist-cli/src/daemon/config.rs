//! Daemon runtime configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use muxgeist_core::aggregate::{
    AggregatorConfig, DEFAULT_MIN_CONTENT_BYTES, DEFAULT_SAFETY_MARGIN, DEFAULT_SELF_TITLE,
};
use muxgeist_core::buffer::DEFAULT_CONTEXT_CAPACITY;
use muxgeist_core::registry::DEFAULT_MAX_SESSIONS;

use crate::args::DaemonArgs;
use crate::daemon::bridge::DEFAULT_COMMAND_TIMEOUT;
use crate::daemon::paths;

/// Default time between ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How long a client may take to send its request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
    pub poll_interval: Duration,
    pub max_sessions: usize,
    pub buffer_capacity: usize,
    pub command_timeout: Duration,
    pub request_timeout: Duration,
    pub self_title: String,
    pub tmux_program: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let socket_path = PathBuf::from(paths::DEFAULT_SOCKET_PATH);
        Self {
            pid_path: paths::pid_path_for(&socket_path),
            socket_path,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_sessions: DEFAULT_MAX_SESSIONS,
            buffer_capacity: DEFAULT_CONTEXT_CAPACITY,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            self_title: DEFAULT_SELF_TITLE.to_string(),
            tmux_program: "tmux".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Build from `muxgeist daemon` flags and the global socket override.
    pub fn from_args(socket: Option<&Path>, args: &DaemonArgs) -> Self {
        Self {
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            max_sessions: args.max_sessions,
            buffer_capacity: args.buffer_capacity,
            command_timeout: Duration::from_millis(args.command_timeout_ms),
            self_title: args.self_title.clone(),
            tmux_program: args.tmux.clone(),
            ..Self::default()
        }
        .with_socket(paths::get_socket_path(socket))
    }

    /// Use `socket_path`, moving the PID file next to it.
    pub fn with_socket(mut self, socket_path: PathBuf) -> Self {
        self.pid_path = paths::pid_path_for(&socket_path);
        self.socket_path = socket_path;
        self
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            capacity: self.buffer_capacity,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            min_content_bytes: DEFAULT_MIN_CONTENT_BYTES,
            self_title: self.self_title.clone(),
        }
    }
}
