//! Plain-text query protocol between the daemon and its clients.
//!
//! A client sends exactly one command and the daemon answers once and closes
//! the connection:
//!
//! | Request | Response |
//! |---|---|
//! | `status` | `OK: <N> sessions tracked` |
//! | `list` | one `<session-id> (<working-directory>)` line per session |
//! | `context:<session-id>` | a [`ContextReport`] block, or `ERROR: Session not found` |
//! | anything else | `ERROR: Unknown command` |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ReportError};
use crate::registry::{SessionRecord, SessionRegistry};

pub const STATUS_COMMAND: &str = "status";
pub const LIST_COMMAND: &str = "list";
pub const CONTEXT_PREFIX: &str = "context:";
pub const ERROR_PREFIX: &str = "ERROR: ";

const PANE_HEADER_START: &str = "=== PANE ";
const PANE_HEADER_END: &str = ") ===";

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    List,
    Context { session: String },
    Unknown(String),
}

impl Command {
    /// Parse a raw request.
    ///
    /// Trailing line terminators and NUL padding are ignored; otherwise the
    /// match is exact, so session ids may contain spaces.
    pub fn parse(request: &str) -> Self {
        let request = request.trim_end_matches(['\r', '\n', '\0']);
        match request {
            STATUS_COMMAND => Self::Status,
            LIST_COMMAND => Self::List,
            _ => match request.strip_prefix(CONTEXT_PREFIX) {
                Some(session) => Self::Context {
                    session: session.to_string(),
                },
                None => Self::Unknown(request.to_string()),
            },
        }
    }

    /// The request text a client sends for this command.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Status => STATUS_COMMAND.to_string(),
            Self::List => LIST_COMMAND.to_string(),
            Self::Context { session } => format!("{}{}", CONTEXT_PREFIX, session),
            Self::Unknown(raw) => raw.clone(),
        }
    }
}

/// One `list` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub working_directory: String,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id().to_string(),
            working_directory: record.working_directory.clone(),
        }
    }
}

/// Everything the daemon knows about one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextReport {
    pub session_id: String,
    pub working_directory: String,
    pub active_pane_id: String,
    /// Unix timestamp (seconds) of the last successful refresh.
    pub last_activity: i64,
    /// Length of `context` in bytes.
    pub context_length: usize,
    pub context: String,
}

impl From<&SessionRecord> for ContextReport {
    fn from(record: &SessionRecord) -> Self {
        Self {
            session_id: record.id().to_string(),
            working_directory: record.working_directory.clone(),
            active_pane_id: record.active_pane_id.clone(),
            last_activity: record.last_activity.timestamp(),
            context_length: record.context_len(),
            context: record.context().as_str().to_string(),
        }
    }
}

impl ContextReport {
    /// Render the wire block.
    pub fn render(&self) -> String {
        format!(
            "Session: {}\nCWD: {}\nPane: {}\nLast Activity: {}\nScrollback Length: {}\nScrollback:\n{}\n",
            self.session_id,
            self.working_directory,
            self.active_pane_id,
            self.last_activity,
            self.context_length,
            self.context
        )
    }

    /// Parse a `context:` response.
    ///
    /// Responses without a `Scrollback:` section (older daemons) parse with
    /// an empty context.
    pub fn parse(text: &str) -> Result<Self, ReportError> {
        if let Some(message) = text.strip_prefix(ERROR_PREFIX) {
            return Err(ReportError::Daemon(message.trim_end().to_string()));
        }

        let (header, context) = match text.split_once("\nScrollback:\n") {
            Some((header, rest)) => (header, rest.strip_suffix('\n').unwrap_or(rest)),
            None => (text, ""),
        };

        let mut session_id = None;
        let mut working_directory = None;
        let mut active_pane_id = None;
        let mut last_activity = None;
        let mut context_length = None;

        for line in header.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.strip_prefix(' ').unwrap_or(value);
            match key {
                "Session" => session_id = Some(value.to_string()),
                "CWD" => working_directory = Some(value.to_string()),
                "Pane" => active_pane_id = Some(value.to_string()),
                "Last Activity" => last_activity = Some(parse_number("Last Activity", value)?),
                "Scrollback Length" => {
                    context_length = Some(parse_number("Scrollback Length", value)?)
                }
                _ => {}
            }
        }

        Ok(Self {
            session_id: session_id.ok_or(ReportError::MissingField("Session"))?,
            working_directory: working_directory.unwrap_or_default(),
            active_pane_id: active_pane_id.unwrap_or_default(),
            last_activity: last_activity.ok_or(ReportError::MissingField("Last Activity"))?,
            context_length: context_length.unwrap_or(context.len()),
            context: context.to_string(),
        })
    }

    /// Per-pane sections of the context, if it was aggregated from panes.
    pub fn pane_sections(&self) -> Vec<PaneSection> {
        split_pane_sections(&self.context)
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ReportError> {
    value.trim().parse().map_err(|_| ReportError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

/// One pane's slice of an aggregated context buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneSection {
    pub pane_id: String,
    pub title: String,
    pub content: String,
}

fn parse_pane_header(line: &str) -> Option<(&str, &str)> {
    let inner = line
        .strip_prefix(PANE_HEADER_START)?
        .strip_suffix(PANE_HEADER_END)?;
    inner.split_once(" (")
}

/// Split an aggregated buffer into its pane sections.
///
/// The newline that precedes each header terminates the previous pane's
/// last line, so section content comes back byte-for-byte. A fallback
/// buffer (raw active-pane capture) has no headers and yields an empty list.
pub fn split_pane_sections(text: &str) -> Vec<PaneSection> {
    let mut sections: Vec<(PaneSection, Vec<&str>)> = Vec::new();

    for line in text.split('\n') {
        if let Some((pane_id, title)) = parse_pane_header(line) {
            let section = PaneSection {
                pane_id: pane_id.to_string(),
                title: title.to_string(),
                content: String::new(),
            };
            sections.push((section, Vec::new()));
        } else if let Some((_, lines)) = sections.last_mut() {
            lines.push(line);
        }
    }

    sections
        .into_iter()
        .map(|(mut section, lines)| {
            section.content = lines.join("\n");
            section
        })
        .collect()
}

/// A response ready to be written to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Status { tracked: usize },
    List(Vec<SessionSummary>),
    Context(ContextReport),
    Error(ProtocolError),
}

impl Response {
    /// Answer `command` from the current registry state.
    pub fn for_command(registry: &SessionRegistry, command: &Command) -> Self {
        match command {
            Command::Status => Self::Status {
                tracked: registry.len(),
            },
            Command::List => Self::List(registry.list().iter().map(SessionSummary::from).collect()),
            Command::Context { session } => match registry.find(session) {
                Some(record) => Self::Context(ContextReport::from(record)),
                None => Self::Error(ProtocolError::SessionNotFound),
            },
            Command::Unknown(_) => Self::Error(ProtocolError::UnknownCommand),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { tracked } => write!(f, "OK: {} sessions tracked", tracked),
            Self::List(sessions) => {
                for session in sessions {
                    writeln!(f, "{} ({})", session.id, session.working_directory)?;
                }
                Ok(())
            }
            Self::Context(report) => f.write_str(&report.render()),
            Self::Error(err) => write!(f, "{}{}", ERROR_PREFIX, err),
        }
    }
}
