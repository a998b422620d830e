//! In-memory multiplexer for tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::MultiplexerError;
use crate::multiplexer::{ActivePane, MultiplexerClient, PaneInfo};

/// Recorded multiplexer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiplexerCall {
    ListSessions,
    ListPanes { session: String },
    CapturePane { session: String, pane: Option<String> },
    ActivePane { session: String },
}

/// A pane of a fake session. `content: None` makes its capture fail.
#[derive(Debug, Clone)]
pub struct FakePane {
    pub info: PaneInfo,
    pub content: Option<String>,
}

/// Fake session state
#[derive(Debug, Clone, Default)]
pub struct FakeSession {
    pub panes: Vec<FakePane>,
    pub active: ActivePane,
    /// Content returned when the active pane is captured.
    pub active_content: String,
    pub fail_list_panes: bool,
    pub fail_active_capture: bool,
    pub fail_metadata: bool,
}

impl FakeSession {
    pub fn new(pane_id: &str, working_directory: &str) -> Self {
        Self {
            active: ActivePane {
                pane_id: pane_id.to_string(),
                working_directory: working_directory.to_string(),
            },
            ..Self::default()
        }
    }

    pub fn with_pane(mut self, id: &str, title: &str, content: &str) -> Self {
        self.panes.push(FakePane {
            info: PaneInfo::new(id, title, "bash"),
            content: Some(content.to_string()),
        });
        self
    }

    pub fn with_failing_pane(mut self, id: &str, title: &str) -> Self {
        self.panes.push(FakePane {
            info: PaneInfo::new(id, title, "bash"),
            content: None,
        });
        self
    }

    pub fn with_active_content(mut self, content: &str) -> Self {
        self.active_content = content.to_string();
        self
    }
}

#[derive(Default)]
struct FakeState {
    sessions: Vec<(String, FakeSession)>,
    fail_discovery: bool,
    calls: Vec<MultiplexerCall>,
}

/// Fake multiplexer for testing. Clones share state.
#[derive(Clone, Default)]
pub struct FakeMultiplexer {
    inner: Arc<Mutex<FakeState>>,
}

fn failed(command: String) -> MultiplexerError {
    MultiplexerError::Failed {
        command,
        status: "exit status: 1".to_string(),
    }
}

impl FakeMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a live session.
    pub fn add_session(&self, id: &str, session: FakeSession) {
        let mut state = self.state();
        match state.sessions.iter_mut().find(|(sid, _)| sid == id) {
            Some((_, existing)) => *existing = session,
            None => state.sessions.push((id.to_string(), session)),
        }
    }

    /// Make a session disappear, as if it had been killed.
    pub fn remove_session(&self, id: &str) {
        self.state().sessions.retain(|(sid, _)| sid != id);
    }

    /// Mutate a live session in place.
    pub fn update_session(&self, id: &str, f: impl FnOnce(&mut FakeSession)) {
        if let Some((_, session)) = self.state().sessions.iter_mut().find(|(sid, _)| sid == id) {
            f(session);
        }
    }

    pub fn set_discovery_failure(&self, fail: bool) {
        self.state().fail_discovery = fail;
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<MultiplexerCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn with_session<T>(
        &self,
        call: MultiplexerCall,
        session: &str,
        f: impl FnOnce(&FakeSession) -> Result<T, MultiplexerError>,
    ) -> Result<T, MultiplexerError> {
        let mut state = self.state();
        state.calls.push(call);
        match state.sessions.iter().find(|(sid, _)| sid == session) {
            Some((_, s)) => f(s),
            None => Err(failed(format!("fake: no session {}", session))),
        }
    }
}

#[async_trait]
impl MultiplexerClient for FakeMultiplexer {
    async fn list_sessions(&self) -> Result<Vec<String>, MultiplexerError> {
        let mut state = self.state();
        state.calls.push(MultiplexerCall::ListSessions);
        if state.fail_discovery {
            return Err(failed("fake: list-sessions".to_string()));
        }
        Ok(state.sessions.iter().map(|(id, _)| id.clone()).collect())
    }

    async fn list_panes(&self, session: &str) -> Result<Vec<PaneInfo>, MultiplexerError> {
        let call = MultiplexerCall::ListPanes {
            session: session.to_string(),
        };
        self.with_session(call, session, |s| {
            if s.fail_list_panes {
                return Err(failed(format!("fake: list-panes {}", session)));
            }
            Ok(s.panes.iter().map(|p| p.info.clone()).collect())
        })
    }

    async fn capture_pane(
        &self,
        session: &str,
        pane: Option<&str>,
    ) -> Result<String, MultiplexerError> {
        let call = MultiplexerCall::CapturePane {
            session: session.to_string(),
            pane: pane.map(String::from),
        };
        self.with_session(call, session, |s| match pane {
            None if s.fail_active_capture => {
                Err(failed(format!("fake: capture-pane {}", session)))
            }
            None => Ok(s.active_content.clone()),
            Some(id) => s
                .panes
                .iter()
                .find(|p| p.info.id == id)
                .and_then(|p| p.content.clone())
                .ok_or_else(|| failed(format!("fake: capture-pane {}:{}", session, id))),
        })
    }

    async fn active_pane(&self, session: &str) -> Result<ActivePane, MultiplexerError> {
        let call = MultiplexerCall::ActivePane {
            session: session.to_string(),
        };
        self.with_session(call, session, |s| {
            if s.fail_metadata {
                return Err(failed(format!("fake: display-message {}", session)));
            }
            Ok(s.active.clone())
        })
    }
}
