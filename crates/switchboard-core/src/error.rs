//! Orchestration error taxonomy
//!
//! Only [`OrchestrationError::Transport`] tears down session state. Every
//! other kind is recovered locally and surfaced as data: tool results,
//! breadcrumbs or guardrail status.

use thiserror::Error;

/// Orchestration error type
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Channel dropped or reported an error
    #[error("transport error: {0}")]
    Transport(String),

    /// Credential provider rejected the session token
    #[error("credentials rejected: {0}")]
    Credentials(String),

    /// Transfer target not reachable from the current agent
    #[error("invalid handoff from '{from}' to '{to}'")]
    InvalidHandoff { from: String, to: String },

    /// Tool handler failed or timed out
    #[error("tool '{tool}' failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    /// Supervisor exchange failed or timed out
    #[error("escalation failed: {0}")]
    EscalationFailure(String),

    /// Guardrail classifier failed or timed out
    #[error("classification failed: {0}")]
    Classification(String),

    /// Operation requires a connected session
    #[error("session not connected")]
    NotConnected,

    /// Session not found in the manager
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Configuration could not be loaded
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Transcript rejected a mutation
    #[error("transcript error: {0}")]
    Transcript(#[from] crate::transcript::TranscriptError),

    /// Inbound envelope could not be decoded
    #[error("envelope error: {0}")]
    Envelope(#[from] crate::channel::EnvelopeError),
}

impl OrchestrationError {
    /// Whether this error tears down the session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestrationError::Transport(_) | OrchestrationError::Credentials(_)
        )
    }

    /// Stable kind label used in structured tool error results
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestrationError::Transport(_) => "TransportError",
            OrchestrationError::Credentials(_) => "CredentialsRejected",
            OrchestrationError::InvalidHandoff { .. } => "InvalidHandoff",
            OrchestrationError::ToolExecution { .. } => "ToolExecutionError",
            OrchestrationError::EscalationFailure(_) => "EscalationFailure",
            OrchestrationError::Classification(_) => "ClassificationError",
            OrchestrationError::NotConnected => "NotConnected",
            OrchestrationError::SessionNotFound(_) => "SessionNotFound",
            OrchestrationError::Config(_) => "ConfigError",
            OrchestrationError::Transcript(_) => "TranscriptError",
            OrchestrationError::Envelope(_) => "EnvelopeError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_fatal() {
        assert!(OrchestrationError::Transport("dropped".into()).is_fatal());
        assert!(OrchestrationError::Credentials("expired".into()).is_fatal());
        assert!(!OrchestrationError::InvalidHandoff {
            from: "a".into(),
            to: "c".into()
        }
        .is_fatal());
        assert!(!OrchestrationError::EscalationFailure("timeout".into()).is_fatal());
        assert!(!OrchestrationError::Classification("timeout".into()).is_fatal());
    }

    #[test]
    fn test_kind_labels() {
        let err = OrchestrationError::InvalidHandoff {
            from: "greeter".into(),
            to: "billing".into(),
        };
        assert_eq!(err.kind(), "InvalidHandoff");
        assert_eq!(err.to_string(), "invalid handoff from 'greeter' to 'billing'");
    }
}
