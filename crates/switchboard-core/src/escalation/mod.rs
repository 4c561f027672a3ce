//! Supervisor escalation
//!
//! A fast realtime agent defers hard turns to a higher-capability agent by
//! calling the reserved supervisor tool. The supervisor answers in a single
//! non-streaming exchange, resolving its own tool calls through the session's
//! executor for a bounded number of rounds. Any failure degrades to an
//! apology the fast agent can speak; the transport never sees an error.

mod coordinator;
mod model;

pub use coordinator::{supervisor_tool_spec, EscalationCoordinator, EscalationError, SupervisorTool};
pub use model::{ExchangeItem, SupervisorModel, SupervisorRequest, SupervisorToolCall, SupervisorTurn};
