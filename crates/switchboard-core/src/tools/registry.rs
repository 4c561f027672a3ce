//! Tool handler registry
//!
//! Handlers are the local tool backend. A tool call resolves locally only if
//! the active agent declares the tool *and* a handler is registered for it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::executor::ToolExecutor;
use crate::agent::ToolSpec;
use crate::transcript::MessageLine;

/// Tool execution result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Output payload sent back to the channel
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Create a success result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    /// Create a success result from a handler's JSON value
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => Self::success(s),
            other => Self::success(other.to_string()),
        }
    }

    /// Create an error result with JSON-formatted error message
    pub fn error(msg: impl std::fmt::Display) -> Self {
        Self {
            output: serde_json::json!({"error": msg.to_string()}).to_string(),
            is_error: true,
        }
    }

    /// Create an error result tagged with an error kind
    pub fn error_kind(kind: &str, msg: impl std::fmt::Display) -> Self {
        Self {
            output: serde_json::json!({"error": msg.to_string(), "kind": kind}).to_string(),
            is_error: true,
        }
    }

    /// Output decoded as JSON, if it is JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.output).ok()
    }
}

/// Parse tool parameters into a typed struct
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> anyhow::Result<T> {
    serde_json::from_value(params).map_err(|e| anyhow::anyhow!("Invalid parameters: {}", e))
}

/// Context for tool execution
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub call_id: String,
    /// Agent the call is resolved against
    pub agent_name: String,
    /// Conversation so far (messages only)
    pub history: Arc<Vec<MessageLine>>,
    /// Nesting level: 0 for calls from the channel
    pub depth: usize,
    /// Optional per-call timeout override
    pub timeout: Option<Duration>,
    /// Cancelled when the session disconnects
    pub cancellation: CancellationToken,
    /// Executor for nested calls (set by the executor before running)
    pub executor: Option<Arc<ToolExecutor>>,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            call_id: String::new(),
            agent_name: String::new(),
            history: Arc::new(Vec::new()),
            depth: 0,
            timeout: None,
            cancellation: CancellationToken::new(),
            executor: None,
        }
    }
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, call_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            call_id: call_id.into(),
            ..Default::default()
        }
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = agent_name.into();
        self
    }

    pub fn with_history(mut self, history: Vec<MessageLine>) -> Self {
        self.history = Arc::new(history);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_executor(mut self, executor: Arc<ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Context for a call made from inside another tool call
    pub fn nested(&self, call_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            agent_name: agent_name.into(),
            depth: self.depth + 1,
            timeout: None,
            ..self.clone()
        }
    }
}

/// Trait for tool implementations
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Tool name (id)
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Execute the tool. Errors become structured tool error results.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> anyhow::Result<Value>;

    /// Execution budget overriding the executor's default
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Declaration to attach to an agent
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// Registry of local tool handlers. Read-only once handed to an executor.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous handler with the same name
    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "Replaced tool handler");
        }
    }

    pub fn with(mut self, tool: Arc<dyn ToolHandler>) -> Self {
        self.register(tool);
        self
    }

    /// Get a handler by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Merge another registry into this one
    pub fn extend(&mut self, other: ToolRegistry) {
        for (_, tool) in other.tools {
            self.register(tool);
        }
    }
}
