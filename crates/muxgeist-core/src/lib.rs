//! Core types and logic for muxgeist.
//!
//! This crate holds everything the session-context daemon does that does not
//! touch a socket or a subprocess directly. The `muxgeist` binary wires these
//! pieces to tmux and a Unix socket.
//!
//! # Modules
//!
//! - [`buffer`]: Fixed-capacity context buffer with char-boundary truncation
//! - [`registry`]: Capacity-bounded session registry
//! - [`multiplexer`]: The capability interface over a terminal multiplexer
//! - [`aggregate`]: Multi-pane capture aggregation with self-exclusion
//! - [`protocol`]: The plain-text query protocol and its parsed forms
//! - [`error`]: Error types shared by the daemon and its clients
//!
//! # Context format
//!
//! A multi-pane context buffer is a sequence of sections, one per retained
//! pane, in pane-enumeration order:
//!
//! ```text
//!
//! === PANE 0.0 (shell) ===
//! $ cargo build
//! ...
//! === PANE 0.1 (logs) ===
//! ...
//! ```
//!
//! When no pane qualifies the buffer is the active pane's raw capture with
//! no headers at all.

pub mod aggregate;
pub mod buffer;
pub mod error;
pub mod multiplexer;
pub mod protocol;
pub mod registry;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
