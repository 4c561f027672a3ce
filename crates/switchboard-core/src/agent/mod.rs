//! Agent definitions, the process-wide registry, and the handoff state machine
//!
//! ## Core Components
//! - `Agent` - Immutable named configuration (instructions, tools, handoffs)
//! - `AgentRegistry` - Read-only after `build()`, shared by `Arc` across sessions
//! - `HandoffState` - The single active agent of a session and its transitions

mod definition;
pub mod handoff;
mod registry;

pub use definition::{Agent, CapabilityTier, ToolSpec};
pub use handoff::{HandoffState, Transition};
pub use registry::{AgentRegistry, AgentRegistryBuilder, RegistryError};
