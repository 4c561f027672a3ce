//! Handoff (transfer) state machine
//!
//! States are one per registered agent plus an uninitialized pre-state
//! (`active == None`). A transfer tool call `transfer_to_<agent>` moves the
//! session to `<agent>` only if it is listed in the current agent's
//! `handoffs`; otherwise the request fails with `InvalidHandoff` and the
//! active agent is left untouched.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use super::definition::{Agent, ToolSpec};
use super::registry::AgentRegistry;
use crate::constants::handoff::TRANSFER_PREFIX;
use crate::error::OrchestrationError;
use crate::tools::ToolResult;

/// Name of the generated transfer tool for `target`
pub fn transfer_tool_name(target: &str) -> String {
    format!("{}{}", TRANSFER_PREFIX, target)
}

/// Target agent named by a transfer tool, or `None` for ordinary tools
pub fn transfer_target(tool_name: &str) -> Option<&str> {
    tool_name
        .strip_prefix(TRANSFER_PREFIX)
        .filter(|target| !target.is_empty())
}

/// Generated transfer tool declaration for `target`
pub fn transfer_tool(target: &Agent) -> ToolSpec {
    let description = format!(
        "Triggers a transfer of the user to a more specialized agent. \
         Calls escalate to a more specialized LLM agent or to human agents, \
         with additional context. Only call this function if one of the available \
         agents is appropriate. Don't transfer to your own agent type.\n\n\
         Agent description: {}",
        target
            .handoff_description
            .as_deref()
            .unwrap_or("(no description)")
    );

    ToolSpec::new(
        transfer_tool_name(&target.name),
        description,
        json!({
            "type": "object",
            "properties": {
                "rationale_for_transfer": {
                    "type": "string",
                    "description": "The reasoning why this transfer is needed."
                },
                "conversation_context": {
                    "type": "string",
                    "description": "Relevant context from the conversation that will help the recipient perform the correct action."
                },
                "destination_agent": {
                    "type": "string",
                    "description": "The more specialized destination_agent that should handle the user's intended request.",
                    "enum": [target.name]
                }
            },
            "required": ["rationale_for_transfer", "conversation_context", "destination_agent"]
        }),
    )
}

/// A completed agent switch
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: Arc<Agent>,
    pub to: Arc<Agent>,
}

impl Transition {
    /// Synthetic tool result acknowledging the transfer
    pub fn tool_result(&self) -> ToolResult {
        ToolResult::success(
            json!({
                "destination_agent": self.to.name,
                "did_transfer": true,
            })
            .to_string(),
        )
    }

    /// Breadcrumb payload recording the switch
    pub fn breadcrumb_data(&self, arguments: &Value) -> Value {
        json!({
            "from": self.from.name,
            "to": self.to.name,
            "rationale": arguments.get("rationale_for_transfer"),
            "context": arguments.get("conversation_context"),
        })
    }
}

/// The single active agent of a session
#[derive(Debug, Default)]
pub struct HandoffState {
    active: Option<Arc<Agent>>,
}

impl HandoffState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&Arc<Agent>> {
        self.active.as_ref()
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref().map(|a| a.name.as_str())
    }

    /// Leave the uninitialized state. No-op if an agent is already active.
    pub fn initialize(&mut self, agent: Arc<Agent>) -> &Arc<Agent> {
        self.active.get_or_insert(agent)
    }

    /// Return to the uninitialized state
    pub fn reset(&mut self) {
        self.active = None;
    }

    /// Attempt a transfer to `target`. On success the active agent is
    /// swapped in place; on failure it is unchanged.
    pub fn transfer(
        &mut self,
        registry: &AgentRegistry,
        target: &str,
    ) -> Result<Transition, OrchestrationError> {
        let from = self
            .active
            .clone()
            .ok_or(OrchestrationError::NotConnected)?;

        let to = if from.can_hand_off_to(target) {
            registry.get(target)
        } else {
            None
        };

        match to {
            Some(to) => {
                info!(from = %from.name, to = %to.name, "Agent handoff");
                self.active = Some(to.clone());
                Ok(Transition { from, to })
            }
            None => {
                warn!(from = %from.name, to = %target, "Rejected handoff");
                Err(OrchestrationError::InvalidHandoff {
                    from: from.name.clone(),
                    to: target.to_string(),
                })
            }
        }
    }
}

/// Synthetic tool result for a rejected transfer, letting the current agent
/// explain the refusal or retry
pub fn rejection_result(error: &OrchestrationError) -> ToolResult {
    ToolResult::error_kind(error.kind(), error)
}
