//! Per-session orchestration
//!
//! A [`Session`] composes the transcript, handoff state, tool executor and
//! guardrail pipeline behind a single state lock. Inbound envelopes are
//! applied strictly in arrival order by one dispatch loop; tool execution,
//! escalation and classification run as tracked tasks whose results are
//! discarded if the session disconnected in the meantime.

mod dispatcher;
mod handle;
mod manager;

#[cfg(test)]
mod session_tests;

use serde::Serialize;

pub use dispatcher::{DispatchOutcome, Effect, EventDispatcher};
pub use handle::{Session, SessionBuilder, SessionSnapshot};
pub use manager::SessionManager;

/// Connection status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Disconnected => "DISCONNECTED",
            SessionStatus::Connecting => "CONNECTING",
            SessionStatus::Connected => "CONNECTED",
        };
        f.write_str(s)
    }
}
