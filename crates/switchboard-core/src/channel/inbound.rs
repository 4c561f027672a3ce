//! Inbound envelope decoding

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tools::parse_arguments;
use crate::transcript::ItemKind;

/// Envelope type tags this engine understands
const KNOWN_TYPES: &[&str] = &[
    "session.status",
    "conversation.item.created",
    "conversation.item.delta",
    "conversation.item.done",
    "tool_call.requested",
    "tool_call.result.sent",
    "error",
];

/// Envelope decoding error
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("envelope has no type tag")]
    MissingType,

    #[error("unrecognized envelope type: {0}")]
    UnknownType(String),
}

/// Connection status reported by the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Connecting,
    Connected,
    Error,
    Disconnected,
}

/// Conversation role of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl From<Role> for ItemKind {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ItemKind::UserMessage,
            Role::Assistant => ItemKind::AssistantMessage,
        }
    }
}

/// A decoded inbound envelope
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    #[serde(rename = "session.status")]
    SessionStatus { status: ChannelStatus },

    #[serde(rename = "conversation.item.created")]
    ItemCreated {
        item_id: String,
        role: Role,
        #[serde(default)]
        text: Option<String>,
    },

    #[serde(rename = "conversation.item.delta")]
    ItemDelta { item_id: String, delta: String },

    #[serde(rename = "conversation.item.done")]
    ItemDone {
        item_id: String,
        #[serde(default)]
        text: Option<String>,
    },

    #[serde(rename = "tool_call.requested")]
    ToolCallRequested {
        call_id: String,
        name: String,
        #[serde(default = "empty_arguments", deserialize_with = "deserialize_arguments")]
        arguments: Value,
    },

    #[serde(rename = "tool_call.result.sent")]
    ToolResultSent { call_id: String },

    #[serde(rename = "error")]
    Error {
        message: String,
        #[serde(default)]
        code: Option<Value>,
    },
}

fn empty_arguments() -> Value {
    Value::Object(Default::default())
}

/// Arguments arrive either as a JSON value or as a JSON-encoded string
fn deserialize_arguments<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(raw) => parse_arguments(&raw),
        Value::Null => empty_arguments(),
        other => other,
    })
}

impl InboundEvent {
    /// Decode a raw envelope
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(raw)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingType)?;
        if !KNOWN_TYPES.contains(&kind) {
            return Err(EnvelopeError::UnknownType(kind.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Wire type tag (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            InboundEvent::SessionStatus { .. } => "session.status",
            InboundEvent::ItemCreated { .. } => "conversation.item.created",
            InboundEvent::ItemDelta { .. } => "conversation.item.delta",
            InboundEvent::ItemDone { .. } => "conversation.item.done",
            InboundEvent::ToolCallRequested { .. } => "tool_call.requested",
            InboundEvent::ToolResultSent { .. } => "tool_call.result.sent",
            InboundEvent::Error { .. } => "error",
        }
    }
}
