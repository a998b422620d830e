//! Daemon process tracking tmux sessions.

pub mod bridge;
pub mod client;
pub mod config;
pub mod paths;
pub mod poll;
pub mod server;
pub mod shutdown;
pub mod tmux;

// Public API - used by main.rs
pub use client::DaemonClient;
pub use config::DaemonConfig;
pub use server::DaemonServer;
pub use shutdown::ShutdownToken;
