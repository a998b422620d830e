//! tmux implementation of [`MultiplexerClient`].

use async_trait::async_trait;
use muxgeist_core::error::MultiplexerError;
use muxgeist_core::multiplexer::{ActivePane, MultiplexerClient, PaneInfo};
use tracing::debug;

use crate::daemon::bridge::ProcessBridge;

/// Format for `list-sessions`: one session name per line.
const SESSION_FORMAT: &str = "#{session_name}";

/// Format for `list-panes`: `window.pane`, title and foreground command.
const PANE_FORMAT: &str = "#{window_index}.#{pane_index}\t#{pane_title}\t#{pane_current_command}";

/// Format for `display-message`: active pane id and its working directory.
const ACTIVE_PANE_FORMAT: &str = "#{pane_id}\t#{pane_current_path}";

/// Output limit for listings and metadata queries.
const QUERY_OUTPUT_LIMIT: usize = 64 * 1024;

/// Queries a tmux server through the `tmux` command line.
#[derive(Debug, Clone)]
pub struct TmuxClient {
    program: String,
    bridge: ProcessBridge,
    /// Output limit for a single pane capture.
    capture_limit: usize,
}

impl TmuxClient {
    pub fn new(program: impl Into<String>, bridge: ProcessBridge, capture_limit: usize) -> Self {
        Self {
            program: program.into(),
            bridge,
            capture_limit,
        }
    }

    /// Run one tmux subcommand, treating a non-zero exit as failure.
    async fn query(&self, args: &[&str], limit: usize) -> Result<String, MultiplexerError> {
        let output = self.bridge.run(&self.program, args, limit).await?;
        if !output.status.success() {
            return Err(MultiplexerError::Failed {
                command: format!("{} {}", self.program, args.join(" ")),
                status: output.status.to_string(),
            });
        }
        if output.truncated {
            debug!("{} {} output cut at {} bytes", self.program, args.join(" "), limit);
        }
        Ok(output.stdout)
    }
}

/// Exact-match target for a session.
///
/// The `=` prefix stops tmux from prefix-matching another session name.
fn session_target(session: &str) -> String {
    format!("={}", session)
}

/// Target for a pane of `session`, or its active pane when `pane` is `None`.
fn pane_target(session: &str, pane: Option<&str>) -> String {
    match pane {
        Some(pane) => format!("={}:{}", session, pane),
        None => format!("={}:", session),
    }
}

fn parse_session_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

fn parse_pane_list(output: &str) -> Vec<PaneInfo> {
    output.lines().filter_map(PaneInfo::parse_line).collect()
}

fn parse_active_pane(output: &str) -> Option<ActivePane> {
    let (pane_id, working_directory) = output.split_once('\t')?;
    if pane_id.is_empty() {
        return None;
    }
    Some(ActivePane {
        pane_id: pane_id.to_string(),
        working_directory: working_directory.to_string(),
    })
}

#[async_trait]
impl MultiplexerClient for TmuxClient {
    async fn list_sessions(&self) -> Result<Vec<String>, MultiplexerError> {
        let output = self
            .query(&["list-sessions", "-F", SESSION_FORMAT], QUERY_OUTPUT_LIMIT)
            .await?;
        Ok(parse_session_list(&output))
    }

    async fn list_panes(&self, session: &str) -> Result<Vec<PaneInfo>, MultiplexerError> {
        let target = session_target(session);
        let output = self
            .query(
                &["list-panes", "-s", "-t", &target, "-F", PANE_FORMAT],
                QUERY_OUTPUT_LIMIT,
            )
            .await?;
        Ok(parse_pane_list(&output))
    }

    async fn capture_pane(
        &self,
        session: &str,
        pane: Option<&str>,
    ) -> Result<String, MultiplexerError> {
        let target = pane_target(session, pane);
        self.query(&["capture-pane", "-p", "-t", &target], self.capture_limit)
            .await
    }

    async fn active_pane(&self, session: &str) -> Result<ActivePane, MultiplexerError> {
        let target = pane_target(session, None);
        let args = ["display-message", "-p", "-t", &target, ACTIVE_PANE_FORMAT];
        let output = self.query(&args, QUERY_OUTPUT_LIMIT).await?;
        parse_active_pane(&output).ok_or_else(|| MultiplexerError::Malformed {
            command: format!("{} {}", self.program, args.join(" ")),
            detail: format!("expected '<pane-id>\\t<path>', got {:?}", output),
        })
    }
}
