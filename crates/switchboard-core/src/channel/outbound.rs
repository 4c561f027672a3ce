//! Outbound commands to the channel

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::inbound::Role;
use crate::agent::{Agent, ToolSpec};
use crate::tools::ToolResult;

/// A command sent to the remote side of the channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundCommand {
    /// Switch the remote model to an agent's instructions and tools
    #[serde(rename = "session.update")]
    SessionUpdate {
        agent: String,
        instructions: String,
        tools: Vec<ToolSpec>,
    },

    #[serde(rename = "tool_call.result")]
    ToolCallResult { call_id: String, output: String },

    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { role: Role, text: String },

    /// Ask the remote model to continue the turn
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl OutboundCommand {
    /// Wire type tag (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundCommand::SessionUpdate { .. } => "session.update",
            OutboundCommand::ToolCallResult { .. } => "tool_call.result",
            OutboundCommand::ConversationItemCreate { .. } => "conversation.item.create",
            OutboundCommand::ResponseCreate => "response.create",
        }
    }

    /// Encode for the wire
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            error!("Failed to encode outbound command: {}", e);
            String::new()
        })
    }
}

/// Command sender for one session
#[derive(Clone)]
pub struct CommandSender {
    session_id: String,
    tx: mpsc::UnboundedSender<OutboundCommand>,
}

impl CommandSender {
    pub fn new(session_id: impl Into<String>, tx: mpsc::UnboundedSender<OutboundCommand>) -> Self {
        Self {
            session_id: session_id.into(),
            tx,
        }
    }

    /// Announce an agent with its full tool list
    pub fn send_session_update(&self, agent: &Agent, tools: Vec<ToolSpec>) {
        self.send(OutboundCommand::SessionUpdate {
            agent: agent.name.clone(),
            instructions: agent.instructions.clone(),
            tools,
        });
    }

    pub fn send_tool_result(&self, call_id: &str, result: &ToolResult) {
        self.send(OutboundCommand::ToolCallResult {
            call_id: call_id.to_string(),
            output: result.output.clone(),
        });
    }

    pub fn send_user_text(&self, text: &str) {
        self.send(OutboundCommand::ConversationItemCreate {
            role: Role::User,
            text: text.to_string(),
        });
    }

    pub fn request_response(&self) {
        self.send(OutboundCommand::ResponseCreate);
    }

    /// Send a raw command
    pub fn send(&self, command: OutboundCommand) {
        debug!(session = %self.session_id, command = command.type_name(), "Outbound command");
        if let Err(e) = self.tx.send(command) {
            error!(session = %self.session_id, "Failed to send outbound command: {}", e);
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the receiving side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
