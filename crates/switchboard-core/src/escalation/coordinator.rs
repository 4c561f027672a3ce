//! Escalation coordinator and the reserved supervisor tool

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::model::{ExchangeItem, SupervisorModel, SupervisorRequest, SupervisorTurn};
use crate::agent::{Agent, AgentRegistry, ToolSpec};
use crate::constants::{escalation, timeouts};
use crate::error::OrchestrationError;
use crate::tools::{execution_error, Outcome, ToolCall, ToolContext, ToolExecutor, ToolHandler};
use crate::transcript::MessageLine;

/// Escalation failure. Never leaves the coordinator: callers see the apology.
#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("no escalated agent registered")]
    NoSupervisor,

    #[error("no tool executor available")]
    NoExecutor,

    #[error("supervisor model failed: {0}")]
    Model(String),

    #[error("malformed supervisor reply: {0}")]
    Malformed(String),

    #[error("supervisor did not answer within {0} rounds")]
    RoundsExhausted(usize),

    #[error("supervisor missed the {0}ms deadline")]
    Deadline(u64),
}

impl From<EscalationError> for OrchestrationError {
    fn from(e: EscalationError) -> Self {
        OrchestrationError::EscalationFailure(e.to_string())
    }
}

/// Runs one-shot exchanges with the escalated agent
pub struct EscalationCoordinator {
    model: Arc<dyn SupervisorModel>,
    registry: Arc<AgentRegistry>,
    deadline: Duration,
    max_rounds: usize,
    apology: String,
}

impl EscalationCoordinator {
    pub fn new(model: Arc<dyn SupervisorModel>, registry: Arc<AgentRegistry>) -> Self {
        Self {
            model,
            registry,
            deadline: timeouts::ESCALATION,
            max_rounds: escalation::MAX_ROUNDS,
            apology: escalation::APOLOGY.to_string(),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_apology(mut self, apology: impl Into<String>) -> Self {
        self.apology = apology.into();
        self
    }

    pub fn apology(&self) -> &str {
        &self.apology
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Ask the supervisor for the next response. Any failure yields the
    /// apology text.
    pub async fn respond(&self, relevant_context: &str, ctx: &ToolContext) -> String {
        match self.consult(relevant_context, ctx).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    session = %ctx.session_id,
                    call_id = %ctx.call_id,
                    error = %e,
                    "Escalation failed, returning apology"
                );
                self.apology.clone()
            }
        }
    }

    /// Run the exchange under the deadline
    pub async fn consult(&self, relevant_context: &str, ctx: &ToolContext) -> Result<String, EscalationError> {
        let supervisor = self
            .registry
            .escalated_agent()
            .ok_or(EscalationError::NoSupervisor)?;
        let executor = ctx.executor.clone().ok_or(EscalationError::NoExecutor)?;

        let request = SupervisorRequest {
            instructions: supervisor.instructions.clone(),
            tools: supervisor.tools.clone(),
            input: vec![ExchangeItem::Message {
                role: "user".to_string(),
                content: supervisor_prompt(&ctx.history, relevant_context),
            }],
        };

        info!(
            session = %ctx.session_id,
            call_id = %ctx.call_id,
            supervisor = %supervisor.name,
            "Escalating to supervisor"
        );

        let exchange = self.exchange(&supervisor, &executor, ctx, request, self.max_rounds);
        match tokio::time::timeout(self.deadline, exchange).await {
            Ok(result) => result,
            Err(_) => Err(EscalationError::Deadline(self.deadline.as_millis() as u64)),
        }
    }

    /// One round: ask the model, resolve its tool calls, recurse with one
    /// round fewer
    fn exchange<'a>(
        &'a self,
        supervisor: &'a Agent,
        executor: &'a Arc<ToolExecutor>,
        ctx: &'a ToolContext,
        mut request: SupervisorRequest,
        rounds_left: usize,
    ) -> BoxFuture<'a, Result<String, EscalationError>> {
        async move {
            if rounds_left == 0 {
                return Err(EscalationError::RoundsExhausted(self.max_rounds));
            }

            let turn = self
                .model
                .respond(&request)
                .await
                .map_err(|e| EscalationError::Model(e.to_string()))?;

            let calls = match turn {
                SupervisorTurn::Final(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        return Err(EscalationError::Malformed("empty final response".into()));
                    }
                    return Ok(text.to_string());
                }
                SupervisorTurn::ToolCalls(calls) if calls.is_empty() => {
                    return Err(EscalationError::Malformed("neither text nor tool calls".into()));
                }
                SupervisorTurn::ToolCalls(calls) => calls,
            };

            debug!(
                call_id = %ctx.call_id,
                calls = calls.len(),
                rounds_left,
                "Supervisor requested tools"
            );

            for call in calls {
                // Scoped under the parent call so supervisor ids never collide
                // with channel call ids in the ledger
                let ledger_id = format!("{}/{}", ctx.call_id, call.call_id);
                let tool_call = ToolCall::new(&ledger_id, &call.name, call.arguments.clone());
                let nested = ctx.nested(&ledger_id, &supervisor.name);

                let result = match executor.execute(supervisor, &tool_call, nested).await {
                    Outcome::Completed(result) | Outcome::Replayed(result) => result,
                    Outcome::Remote => execution_error(&call.name, "not available to the supervisor"),
                    Outcome::Dropped => execution_error(
                        &call.name,
                        format!("call '{}' is already in progress", call.call_id),
                    ),
                };

                request.input.push(ExchangeItem::FunctionCall {
                    call_id: call.call_id.clone(),
                    name: call.name,
                    arguments: call.arguments.to_string(),
                });
                request.input.push(ExchangeItem::FunctionCallOutput {
                    call_id: call.call_id,
                    output: result.output,
                });
            }

            self.exchange(supervisor, executor, ctx, request, rounds_left - 1)
                .await
        }
        .boxed()
    }
}

fn supervisor_prompt(history: &[MessageLine], relevant_context: &str) -> String {
    let history = serde_json::to_string_pretty(history).unwrap_or_default();
    format!(
        "==== Conversation History ====\n{}\n\n==== Relevant Context From Last User Message ===\n{}",
        history, relevant_context
    )
}

/// Declaration of the reserved supervisor tool
pub fn supervisor_tool_spec() -> ToolSpec {
    ToolSpec::new(
        escalation::SUPERVISOR_TOOL,
        "Determines the next response whenever the agent faces a non-trivial decision, \
         produced by a highly intelligent supervisor agent. Returns a message describing what to do next.",
        json!({
            "type": "object",
            "properties": {
                (escalation::SUPERVISOR_CONTEXT_PARAM): {
                    "type": "string",
                    "description": "Key information from the user described in their most recent message. \
                                    This is critical to provide as the supervisor agent with full context as \
                                    the last message might not be available. Okay to omit if the user message \
                                    didn't add any new information."
                }
            },
            "required": [escalation::SUPERVISOR_CONTEXT_PARAM],
            "additionalProperties": false
        }),
    )
}

/// Tool handler the fast agent calls to escalate
pub struct SupervisorTool {
    coordinator: Arc<EscalationCoordinator>,
    spec: ToolSpec,
}

impl SupervisorTool {
    pub fn new(coordinator: Arc<EscalationCoordinator>) -> Self {
        Self {
            coordinator,
            spec: supervisor_tool_spec(),
        }
    }
}

#[async_trait]
impl ToolHandler for SupervisorTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    fn parameters_schema(&self) -> Value {
        self.spec.parameters.clone()
    }

    /// Deadline plus margin; the coordinator always answers first
    fn timeout(&self) -> Option<Duration> {
        Some(self.coordinator.deadline() + escalation::DEADLINE_MARGIN)
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let context = params
            .get(escalation::SUPERVISOR_CONTEXT_PARAM)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let text = self.coordinator.respond(context, ctx).await;
        Ok(json!({ "nextResponse": text }))
    }
}
