//! Capability interface over a terminal multiplexer.

use async_trait::async_trait;

use crate::error::MultiplexerError;

/// Title used when the multiplexer reports an empty pane title.
pub const DEFAULT_PANE_TITLE: &str = "shell";

/// One pane of a session as reported by a pane listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    /// Pane address within its session (tmux `window.pane`).
    pub id: String,
    pub title: String,
    /// Foreground command running in the pane.
    pub command: String,
}

impl PaneInfo {
    pub fn new(id: impl Into<String>, title: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            command: command.into(),
        }
    }

    /// Parse one tab-separated `id\ttitle\tcommand` listing line.
    ///
    /// Missing title or command fields are tolerated. Returns `None` for a
    /// line without a pane id.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.splitn(3, '\t');
        let id = fields.next()?.trim();
        if id.is_empty() {
            return None;
        }
        let title = match fields.next() {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_PANE_TITLE,
        };
        let command = fields.next().unwrap_or_default();
        Some(Self::new(id, title, command))
    }
}

/// Metadata about a session's focused pane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivePane {
    pub pane_id: String,
    pub working_directory: String,
}

/// The queries the daemon needs from a terminal multiplexer.
///
/// All methods are read-only. Implementations report each failed external
/// call as an error and never retry.
#[async_trait]
pub trait MultiplexerClient: Send + Sync {
    /// Enumerate the names of all live sessions.
    async fn list_sessions(&self) -> Result<Vec<String>, MultiplexerError>;

    /// Enumerate the panes of `session` in multiplexer order.
    async fn list_panes(&self, session: &str) -> Result<Vec<PaneInfo>, MultiplexerError>;

    /// Capture the visible content of a pane.
    ///
    /// With `pane == None` the session's active pane is captured.
    async fn capture_pane(
        &self,
        session: &str,
        pane: Option<&str>,
    ) -> Result<String, MultiplexerError>;

    /// Query the focused pane's id and working directory.
    async fn active_pane(&self, session: &str) -> Result<ActivePane, MultiplexerError>;
}
