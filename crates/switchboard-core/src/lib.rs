//! Switchboard Core - realtime agent orchestration engine
//!
//! This crate turns the event stream of a live voice conversation into
//! conversation state:
//! - Typed envelopes and ordered dispatch per session
//! - Agent registry with handoff (transfer) state machine
//! - Tool execution with at-most-once semantics per call id
//! - Supervisor escalation from a fast agent to an escalated agent
//! - Guardrail classification of finalized assistant messages
//! - Append-only transcript with breadcrumbs

pub mod agent;
pub mod backend;
pub mod channel;
pub mod config;
pub mod constants;
pub mod error;
pub mod escalation;
pub mod guardrail;
pub mod scenarios;
pub mod session;
pub mod tools;
pub mod transcript;

// Re-exports for convenience
pub use agent::{Agent, AgentRegistry, CapabilityTier, ToolSpec};
pub use channel::{InboundEvent, OutboundCommand};
pub use config::Config;
pub use error::OrchestrationError;
pub use guardrail::{Classifier, GuardrailPipeline, GuardrailResult, GuardrailStatus};
pub use scenarios::Scenario;
pub use session::{EventDispatcher, Session, SessionBuilder, SessionManager, SessionStatus};
pub use tools::{ToolExecutor, ToolHandler, ToolRegistry, ToolResult};
pub use transcript::{ItemKind, ItemStatus, TranscriptItem, TranscriptStore};
