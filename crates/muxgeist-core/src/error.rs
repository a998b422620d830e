//! Error types for multiplexer queries and the query protocol.

use std::time::Duration;

use thiserror::Error;

/// A failed query against the terminal multiplexer.
///
/// Every variant carries the command line that failed so log lines can be
/// traced back to a specific external call.
#[derive(Debug, Error)]
pub enum MultiplexerError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read output of '{command}': {source}")]
    Read {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' timed out after {}ms", timeout.as_millis())]
    TimedOut { command: String, timeout: Duration },

    #[error("'{command}' exited with {status}")]
    Failed { command: String, status: String },

    #[error("unexpected output from '{command}': {detail}")]
    Malformed { command: String, detail: String },
}

/// Errors reported to query clients as `ERROR: <message>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Session not found")]
    SessionNotFound,

    #[error("Unknown command")]
    UnknownCommand,
}

/// A `context:` response that could not be parsed back into a report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("daemon returned an error: {0}")]
    Daemon(String),

    #[error("missing '{0}' field in context response")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {value:?}")]
    InvalidValue { field: &'static str, value: String },
}
