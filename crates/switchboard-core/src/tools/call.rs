//! Tool call record owned by a transcript breadcrumb

use serde::Serialize;
use serde_json::Value;

use super::registry::ToolResult;
use crate::agent::handoff::transfer_target;

/// A tool call requested by the channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    /// Unique id supplied by the channel
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    /// Absent until resolved locally
    pub result: Option<ToolResult>,
    pub resolved_once: bool,
    /// No local handler; the remote side resolves it
    pub remote: bool,
}

impl ToolCall {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
            result: None,
            resolved_once: false,
            remote: false,
        }
    }

    /// Store the result. Only the first resolution is kept.
    pub fn resolve(&mut self, result: ToolResult) -> bool {
        if self.resolved_once {
            return false;
        }
        self.result = Some(result);
        self.resolved_once = true;
        true
    }

    pub fn mark_remote(&mut self) {
        self.remote = true;
    }

    /// Whether this call follows the reserved transfer convention
    pub fn is_transfer(&self) -> bool {
        transfer_target(&self.tool_name).is_some()
    }
}

/// Decode tool arguments as sent on the wire.
///
/// Arguments usually arrive as a JSON-encoded string. Empty input becomes
/// `{}`; undecodable input is preserved under `raw`.
pub fn parse_arguments(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| serde_json::json!({ "raw": raw }))
}
