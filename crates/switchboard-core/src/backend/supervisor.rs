//! Supervisor model over the Responses API

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::client::{item_type, output_items, output_text, ResponsesClient};
use crate::agent::ToolSpec;
use crate::escalation::{SupervisorModel, SupervisorRequest, SupervisorToolCall, SupervisorTurn};
use crate::tools::parse_arguments;

pub struct ResponsesSupervisor {
    client: Arc<ResponsesClient>,
    model: String,
}

impl ResponsesSupervisor {
    pub fn new(client: Arc<ResponsesClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl SupervisorModel for ResponsesSupervisor {
    async fn respond(&self, request: &SupervisorRequest) -> Result<SupervisorTurn> {
        let body = request_body(&self.model, request);
        let response = self.client.create(&body).await?;
        let turn = parse_turn(&response)?;
        debug!(
            model = %self.model,
            tool_calls = matches!(turn, SupervisorTurn::ToolCalls(_)),
            "Supervisor responded"
        );
        Ok(turn)
    }
}

fn function_tool(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "name": spec.name,
        "description": spec.description,
        "parameters": spec.parameters,
    })
}

fn request_body(model: &str, request: &SupervisorRequest) -> Value {
    json!({
        "model": model,
        "instructions": request.instructions,
        "tools": request.tools.iter().map(function_tool).collect::<Vec<_>>(),
        "input": request.input,
        "parallel_tool_calls": false,
    })
}

/// Function calls win over text: a response carrying any `function_call`
/// item is a tool round.
fn parse_turn(body: &Value) -> Result<SupervisorTurn> {
    if body.get("output").and_then(|o| o.as_array()).is_none() {
        anyhow::bail!("response has no output");
    }

    let calls: Vec<SupervisorToolCall> = output_items(body)
        .filter(|item| item_type(item) == Some("function_call"))
        .map(|item| {
            let field = |key: &str| item.get(key).and_then(|v| v.as_str()).unwrap_or_default();
            SupervisorToolCall {
                call_id: field("call_id").to_string(),
                name: field("name").to_string(),
                arguments: parse_arguments(field("arguments")),
            }
        })
        .collect();

    if let Some(call) = calls.iter().find(|c| c.call_id.is_empty() || c.name.is_empty()) {
        anyhow::bail!("function call missing id or name: {:?}", call);
    }
    if !calls.is_empty() {
        return Ok(SupervisorTurn::ToolCalls(calls));
    }
    Ok(SupervisorTurn::Final(output_text(body)))
}
