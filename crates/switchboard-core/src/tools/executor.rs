//! Per-session tool invocation executor
//!
//! Every call id the session sees is recorded in a ledger for the lifetime of
//! the session. A repeated call id never reaches the handler again: it
//! short-circuits to the stored result, or is dropped while the first
//! invocation is still pending.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::call::ToolCall;
use super::registry::{ToolContext, ToolHandler, ToolRegistry, ToolResult};
use crate::agent::Agent;
use crate::constants;
use crate::error::OrchestrationError;

/// Structured error result for a failed local call
pub(crate) fn execution_error(tool: &str, reason: impl std::fmt::Display) -> ToolResult {
    let error = OrchestrationError::ToolExecution {
        tool: tool.to_string(),
        reason: reason.to_string(),
    };
    ToolResult::error_kind(error.kind(), &error)
}

/// Ledger state of one call id
#[derive(Debug, Clone)]
enum CallState {
    Pending,
    Resolved(ToolResult),
    Remote,
}

#[derive(Debug)]
struct LedgerEntry {
    state: CallState,
    /// Channel confirmed the result was sent
    acknowledged: bool,
}

/// Outcome of presenting a call id to the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// First sighting; the caller owns execution
    Fresh,
    /// Already running
    Pending,
    /// Already resolved locally
    Resolved(ToolResult),
    /// Already recorded as resolved remotely
    Remote,
}

/// Result of running a single call
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    Local(ToolResult),
    /// No local handler for this agent; resolved by the remote side
    Remote,
}

/// Result of [`ToolExecutor::execute`]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(ToolResult),
    /// Duplicate call id answered from the ledger
    Replayed(ToolResult),
    Remote,
    /// Duplicate of a call still in flight
    Dropped,
}

/// Resolves tool calls against local handlers with at-most-once semantics
pub struct ToolExecutor {
    tools: Arc<ToolRegistry>,
    ledger: Mutex<HashMap<String, LedgerEntry>>,
    default_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            ledger: Mutex::new(HashMap::new()),
            default_timeout: constants::timeouts::TOOL_EXECUTION,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Record a call id. Only a `Fresh` admission may execute the call.
    pub fn admit(&self, call_id: &str) -> Admission {
        let mut ledger = self.ledger.lock();
        match ledger.get(call_id) {
            Some(entry) => match &entry.state {
                CallState::Pending => Admission::Pending,
                CallState::Resolved(result) => Admission::Resolved(result.clone()),
                CallState::Remote => Admission::Remote,
            },
            None => {
                ledger.insert(
                    call_id.to_string(),
                    LedgerEntry {
                        state: CallState::Pending,
                        acknowledged: false,
                    },
                );
                Admission::Fresh
            }
        }
    }

    /// Store the result of a pending call. Returns `false` if the call was
    /// already settled or never admitted.
    pub fn settle(&self, call_id: &str, result: ToolResult) -> bool {
        let mut ledger = self.ledger.lock();
        match ledger.get_mut(call_id) {
            Some(entry) if matches!(entry.state, CallState::Pending) => {
                entry.state = CallState::Resolved(result);
                true
            }
            _ => false,
        }
    }

    /// Record a pending call as resolved by the remote side
    pub fn mark_remote(&self, call_id: &str) -> bool {
        let mut ledger = self.ledger.lock();
        match ledger.get_mut(call_id) {
            Some(entry) if matches!(entry.state, CallState::Pending) => {
                entry.state = CallState::Remote;
                true
            }
            _ => false,
        }
    }

    /// Mark a call's result as delivered. Returns `false` for unknown ids.
    pub fn acknowledge(&self, call_id: &str) -> bool {
        match self.ledger.lock().get_mut(call_id) {
            Some(entry) => {
                entry.acknowledged = true;
                true
            }
            None => false,
        }
    }

    pub fn is_acknowledged(&self, call_id: &str) -> bool {
        self.ledger
            .lock()
            .get(call_id)
            .is_some_and(|entry| entry.acknowledged)
    }

    /// Stored local result for a call id
    pub fn result_for(&self, call_id: &str) -> Option<ToolResult> {
        match &self.ledger.lock().get(call_id)?.state {
            CallState::Resolved(result) => Some(result.clone()),
            _ => None,
        }
    }

    /// Call ids admitted but not yet settled
    pub fn pending_calls(&self) -> Vec<String> {
        let mut pending: Vec<String> = self
            .ledger
            .lock()
            .iter()
            .filter(|(_, entry)| matches!(entry.state, CallState::Pending))
            .map(|(id, _)| id.clone())
            .collect();
        pending.sort();
        pending
    }

    /// Handler for `tool_name` if `agent` declares it and one is registered
    pub fn handler_for(&self, agent: &Agent, tool_name: &str) -> Option<Arc<dyn ToolHandler>> {
        if !agent.has_tool(tool_name) {
            return None;
        }
        self.tools.get(tool_name)
    }

    /// Whether a call would be resolved locally
    pub fn resolves_locally(&self, agent: &Agent, tool_name: &str) -> bool {
        self.handler_for(agent, tool_name).is_some()
    }

    /// Run an admitted call. Does not touch the ledger.
    ///
    /// The handler runs on its own task so a panic is contained; errors,
    /// panics and timeouts all become structured error results.
    pub async fn run(self: &Arc<Self>, agent: &Agent, call: &ToolCall, ctx: ToolContext) -> Execution {
        if ctx.depth > constants::escalation::MAX_TOOL_DEPTH {
            warn!(
                call_id = %call.call_id,
                tool = %call.tool_name,
                depth = ctx.depth,
                "Tool call nesting too deep"
            );
            return Execution::Local(execution_error(
                &call.tool_name,
                format!(
                    "call depth {} exceeds limit of {}",
                    ctx.depth,
                    constants::escalation::MAX_TOOL_DEPTH
                ),
            ));
        }

        let Some(handler) = self.handler_for(agent, &call.tool_name) else {
            debug!(
                call_id = %call.call_id,
                tool = %call.tool_name,
                agent = %agent.name,
                "No local handler, tool resolved remotely"
            );
            return Execution::Remote;
        };

        let timeout = ctx
            .timeout
            .or_else(|| handler.timeout())
            .unwrap_or(self.default_timeout);
        let cancellation = ctx.cancellation.clone();
        let mut task_ctx = ctx;
        task_ctx.executor = Some(Arc::clone(self));
        let params = call.arguments.clone();

        info!(
            call_id = %call.call_id,
            tool = %call.tool_name,
            agent = %agent.name,
            depth = task_ctx.depth,
            "Executing tool"
        );

        let mut handle = tokio::spawn(async move { handler.execute(params, &task_ctx).await });
        let abort = handle.abort_handle();

        let result = tokio::select! {
            joined = tokio::time::timeout(timeout, &mut handle) => match joined {
                Ok(Ok(Ok(value))) => ToolResult::from_value(value),
                Ok(Ok(Err(e))) => {
                    warn!(call_id = %call.call_id, tool = %call.tool_name, error = %e, "Tool failed");
                    execution_error(&call.tool_name, e)
                }
                Ok(Err(join_err)) => {
                    warn!(call_id = %call.call_id, tool = %call.tool_name, "Tool task aborted: {}", join_err);
                    execution_error(&call.tool_name, "panicked")
                }
                Err(_) => {
                    abort.abort();
                    warn!(
                        call_id = %call.call_id,
                        tool = %call.tool_name,
                        timeout_ms = timeout.as_millis() as u64,
                        "Tool timed out"
                    );
                    execution_error(
                        &call.tool_name,
                        format!("timed out after {}ms", timeout.as_millis()),
                    )
                }
            },
            _ = cancellation.cancelled() => {
                abort.abort();
                debug!(call_id = %call.call_id, tool = %call.tool_name, "Tool cancelled");
                execution_error(&call.tool_name, "session disconnected")
            }
        };

        Execution::Local(result)
    }

    /// Admit, run and settle a call in one step. Used for nested calls that
    /// have no transcript entry of their own.
    pub async fn execute(self: &Arc<Self>, agent: &Agent, call: &ToolCall, ctx: ToolContext) -> Outcome {
        match self.admit(&call.call_id) {
            Admission::Fresh => {}
            Admission::Resolved(result) => return Outcome::Replayed(result),
            Admission::Remote => return Outcome::Remote,
            Admission::Pending => {
                debug!(call_id = %call.call_id, "Duplicate of in-flight call dropped");
                return Outcome::Dropped;
            }
        }

        match self.run(agent, call, ctx).await {
            Execution::Local(result) => {
                self.settle(&call.call_id, result.clone());
                Outcome::Completed(result)
            }
            Execution::Remote => {
                self.mark_remote(&call.call_id);
                Outcome::Remote
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolHandler for Counting {
        fn name(&self) -> &str {
            "lookupOrders"
        }
        fn description(&self) -> &str {
            "Look up orders"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"orders": []}))
        }
    }

    struct Failing;

    #[async_trait]
    impl ToolHandler for Failing {
        fn name(&self) -> &str {
            "fails"
        }
        fn description(&self) -> &str {
            ""
        }
        fn parameters_schema(&self) -> Value {
            json!({})
        }
        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
            anyhow::bail!("backend unavailable")
        }
    }

    struct Panicking;

    #[async_trait]
    impl ToolHandler for Panicking {
        fn name(&self) -> &str {
            "panics"
        }
        fn description(&self) -> &str {
            ""
        }
        fn parameters_schema(&self) -> Value {
            json!({})
        }
        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
            panic!("handler bug")
        }
    }

    struct Sleepy;

    #[async_trait]
    impl ToolHandler for Sleepy {
        fn name(&self) -> &str {
            "sleeps"
        }
        fn description(&self) -> &str {
            ""
        }
        fn parameters_schema(&self) -> Value {
            json!({})
        }
        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!("late"))
        }
    }

    /// Slower than the executor default but within its own budget
    struct Patient;

    #[async_trait]
    impl ToolHandler for Patient {
        fn name(&self) -> &str {
            "patient"
        }
        fn description(&self) -> &str {
            ""
        }
        fn parameters_schema(&self) -> Value {
            json!({})
        }
        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_secs(2))
        }
        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok(json!("done"))
        }
    }

    fn setup() -> (Arc<ToolExecutor>, Agent, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let tools = ToolRegistry::new()
            .with(Arc::new(Counting {
                calls: calls.clone(),
            }))
            .with(Arc::new(Failing))
            .with(Arc::new(Panicking))
            .with(Arc::new(Sleepy));
        let agent = Agent::new("returns", "")
            .with_tools(tools.names().into_iter().map(|n| tools.get(n).unwrap().spec()))
            .with_tool(crate::agent::ToolSpec::new("checkout", "remote only", json!({})));
        let executor = Arc::new(ToolExecutor::new(Arc::new(tools)).with_timeout(Duration::from_millis(50)));
        (executor, agent, calls)
    }

    #[tokio::test]
    async fn test_duplicate_call_id_runs_once() {
        let (executor, agent, calls) = setup();
        let call = ToolCall::new("call_1", "lookupOrders", json!({}));

        let first = executor.execute(&agent, &call, ToolContext::default()).await;
        let second = executor.execute(&agent, &call, ToolContext::default()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let Outcome::Completed(first) = first else {
            panic!("expected completion, got {:?}", first);
        };
        assert_eq!(second, Outcome::Replayed(first));
    }

    #[tokio::test]
    async fn test_pending_duplicate_is_dropped() {
        let (executor, agent, calls) = setup();
        assert_eq!(executor.admit("call_1"), Admission::Fresh);

        let call = ToolCall::new("call_1", "lookupOrders", json!({}));
        let outcome = executor.execute(&agent, &call, ToolContext::default()).await;

        assert_eq!(outcome, Outcome::Dropped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(executor.pending_calls(), vec!["call_1".to_string()]);
    }

    #[tokio::test]
    async fn test_undeclared_or_unregistered_tool_is_remote() {
        let (executor, agent, _) = setup();
        let remote = ToolCall::new("call_1", "checkout", json!({}));
        assert_eq!(
            executor.execute(&agent, &remote, ToolContext::default()).await,
            Outcome::Remote
        );
        assert_eq!(executor.admit("call_1"), Admission::Remote);

        // Registered handler, but this agent does not declare it
        let other = Agent::new("sales", "");
        let call = ToolCall::new("call_2", "lookupOrders", json!({}));
        assert_eq!(
            executor.execute(&other, &call, ToolContext::default()).await,
            Outcome::Remote
        );
    }

    #[tokio::test]
    async fn test_handler_error_becomes_structured_result() {
        let (executor, agent, _) = setup();
        let call = ToolCall::new("call_1", "fails", json!({}));
        let Outcome::Completed(result) = executor.execute(&agent, &call, ToolContext::default()).await else {
            panic!("expected completion");
        };
        assert!(result.is_error);
        let json = result.json().unwrap();
        assert_eq!(json["kind"], "ToolExecutionError");
        assert!(json["error"].as_str().unwrap().contains("backend unavailable"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let (executor, agent, _) = setup();
        let call = ToolCall::new("call_1", "panics", json!({}));
        let Outcome::Completed(result) = executor.execute(&agent, &call, ToolContext::default()).await else {
            panic!("expected completion");
        };
        assert!(result.is_error);
        assert_eq!(result.json().unwrap()["kind"], "ToolExecutionError");
    }

    #[tokio::test]
    async fn test_handler_timeout() {
        let (executor, agent, _) = setup();
        let call = ToolCall::new("call_1", "sleeps", json!({}));
        let Outcome::Completed(result) = executor.execute(&agent, &call, ToolContext::default()).await else {
            panic!("expected completion");
        };
        assert!(result.is_error);
        assert!(result.output.contains("timed out"));
    }

    #[tokio::test]
    async fn test_handler_timeout_overrides_default() {
        let tools = ToolRegistry::new().with(Arc::new(Patient));
        let agent = Agent::new("returns", "").with_tool(tools.get("patient").unwrap().spec());
        let executor = Arc::new(ToolExecutor::new(Arc::new(tools)).with_timeout(Duration::from_millis(50)));

        let call = ToolCall::new("call_1", "patient", json!({}));
        let Outcome::Completed(result) = executor.execute(&agent, &call, ToolContext::default()).await else {
            panic!("expected completion");
        };
        assert!(!result.is_error, "{}", result.output);
        assert_eq!(result.output, "done");

        // An explicit context budget still wins over the handler's
        let ctx = ToolContext::default().with_timeout(Duration::from_millis(20));
        let call = ToolCall::new("call_2", "patient", json!({}));
        let Outcome::Completed(result) = executor.execute(&agent, &call, ctx).await else {
            panic!("expected completion");
        };
        assert!(result.output.contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_handler() {
        let (executor, agent, _) = setup();
        let ctx = ToolContext::default().with_timeout(Duration::from_secs(10));
        ctx.cancellation.cancel();
        let call = ToolCall::new("call_1", "sleeps", json!({}));
        let Execution::Local(result) = executor.run(&agent, &call, ctx).await else {
            panic!("expected local execution");
        };
        assert!(result.output.contains("session disconnected"));
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let (executor, agent, calls) = setup();
        let mut ctx = ToolContext::default();
        ctx.depth = constants::escalation::MAX_TOOL_DEPTH + 1;
        let call = ToolCall::new("call_1", "lookupOrders", json!({}));
        let Outcome::Completed(result) = executor.execute(&agent, &call, ctx).await else {
            panic!("expected completion");
        };
        assert!(result.is_error);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_settle_and_acknowledge() {
        let (executor, _, _) = setup();
        assert!(!executor.settle("unknown", ToolResult::success("x")));
        assert!(!executor.acknowledge("unknown"));

        executor.admit("call_1");
        assert!(executor.settle("call_1", ToolResult::success("x")));
        assert!(!executor.settle("call_1", ToolResult::success("y")));
        assert_eq!(executor.result_for("call_1").unwrap().output, "x");

        assert!(!executor.is_acknowledged("call_1"));
        assert!(executor.acknowledge("call_1"));
        assert!(executor.is_acknowledged("call_1"));
    }
}
