//! Supervisor model collaborator

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::agent::ToolSpec;

/// One entry of the supervisor exchange input
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExchangeItem {
    Message {
        role: String,
        content: String,
    },
    FunctionCall {
        call_id: String,
        name: String,
        /// JSON-encoded arguments
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

/// A single non-streaming request to the supervisor
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorRequest {
    pub instructions: String,
    pub tools: Vec<ToolSpec>,
    pub input: Vec<ExchangeItem>,
}

/// A tool call requested by the supervisor
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

/// What the supervisor answered
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorTurn {
    /// Final text for the fast agent to relay
    Final(String),
    /// Tools to resolve before asking again
    ToolCalls(Vec<SupervisorToolCall>),
}

/// Higher-capability model consulted during escalation
#[async_trait]
pub trait SupervisorModel: Send + Sync {
    async fn respond(&self, request: &SupervisorRequest) -> anyhow::Result<SupervisorTurn>;
}
