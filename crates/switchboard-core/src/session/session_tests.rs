//! End-to-end session tests driven through raw envelopes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

use super::*;
use crate::agent::{Agent, AgentRegistry, CapabilityTier, ToolSpec};
use crate::channel::{OutboundCommand, StaticCredentials};
use crate::constants::escalation::{APOLOGY, SUPERVISOR_CONTEXT_PARAM, SUPERVISOR_TOOL};
use crate::constants::transcript::{INAUDIBLE, TRANSCRIBING};
use crate::error::OrchestrationError;
use crate::escalation::{
    supervisor_tool_spec, EscalationCoordinator, SupervisorModel, SupervisorRequest, SupervisorTurn,
};
use crate::guardrail::{Classification, Classifier, GuardrailPipeline, GuardrailStatus, ModerationCategory};
use crate::tools::{ToolContext, ToolHandler, ToolRegistry};
use crate::transcript::{ItemKind, ItemStatus, MessageLine, TranscriptItem};

// ---------------------------------------------------------------------------
// Collaborator doubles
// ---------------------------------------------------------------------------

struct CountingTool {
    name: &'static str,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolHandler for CountingTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "counts invocations"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"echo": params}))
    }
}

struct FailingTool;

#[async_trait]
impl ToolHandler for FailingTool {
    fn name(&self) -> &str {
        "fails"
    }
    fn description(&self) -> &str {
        "always fails"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        anyhow::bail!("inventory service down")
    }
}

/// Blocks until released
struct GatedTool {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl ToolHandler for GatedTool {
    fn name(&self) -> &str {
        "gated"
    }
    fn description(&self) -> &str {
        "waits for the test"
    }
    fn parameters_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(json!("released"))
    }
}

struct FixedClassifier(ModerationCategory);

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _text: &str, _context: &[MessageLine]) -> anyhow::Result<Classification> {
        Ok(Classification::new(self.0))
    }
}

/// Records what it was asked and answers `None`
#[derive(Default)]
struct RecordingClassifier {
    seen: Mutex<Vec<(String, Vec<MessageLine>)>>,
}

#[async_trait]
impl Classifier for RecordingClassifier {
    async fn classify(&self, text: &str, context: &[MessageLine]) -> anyhow::Result<Classification> {
        self.seen.lock().push((text.to_string(), context.to_vec()));
        Ok(Classification::new(ModerationCategory::None))
    }
}

struct SlowClassifier;

#[async_trait]
impl Classifier for SlowClassifier {
    async fn classify(&self, _text: &str, _context: &[MessageLine]) -> anyhow::Result<Classification> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Classification::new(ModerationCategory::None))
    }
}

struct GatedClassifier {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Classifier for GatedClassifier {
    async fn classify(&self, _text: &str, _context: &[MessageLine]) -> anyhow::Result<Classification> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(Classification::new(ModerationCategory::None))
    }
}

struct SlowSupervisor;

#[async_trait]
impl SupervisorModel for SlowSupervisor {
    async fn respond(&self, _request: &SupervisorRequest) -> anyhow::Result<SupervisorTurn> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(SupervisorTurn::Final("too late".into()))
    }
}

struct QuickSupervisor;

#[async_trait]
impl SupervisorModel for QuickSupervisor {
    async fn respond(&self, _request: &SupervisorRequest) -> anyhow::Result<SupervisorTurn> {
        Ok(SupervisorTurn::Final("Your plan includes unlimited data.".into()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn tool_spec(name: &str) -> ToolSpec {
    ToolSpec::new(name, "test tool", json!({"type": "object"}))
}

/// a -> b, b -> a, c -> a. `c` is unreachable from `a`.
fn registry() -> Arc<AgentRegistry> {
    Arc::new(
        AgentRegistry::builder()
            .agent(
                Agent::new("a", "Agent A")
                    .with_tools([tool_spec("fails"), tool_spec("gated"), tool_spec("checkout")])
                    .with_handoff("b"),
            )
            .agent(
                Agent::new("b", "Agent B")
                    .with_tool(tool_spec("lookupOrders"))
                    .with_handoff("a")
                    .with_handoff_description("Order specialist"),
            )
            .agent(Agent::new("c", "Agent C").with_handoff("a"))
            .build()
            .unwrap(),
    )
}

struct Harness {
    session: Arc<Session>,
    rx: mpsc::UnboundedReceiver<OutboundCommand>,
    calls: Arc<AtomicUsize>,
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl Harness {
    fn new(configure: impl FnOnce(SessionBuilder) -> SessionBuilder) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let tools = ToolRegistry::new()
            .with(Arc::new(CountingTool {
                name: "lookupOrders",
                calls: calls.clone(),
            }))
            .with(Arc::new(FailingTool))
            .with(Arc::new(GatedTool {
                started: started.clone(),
                release: release.clone(),
            }));
        let builder = SessionBuilder::new(registry())
            .with_id("test-session")
            .with_tools(tools)
            .with_tool_timeout(Duration::from_secs(5));
        let (tx, rx) = mpsc::unbounded_channel();
        let session = configure(builder).build(tx);
        Self {
            session,
            rx,
            calls,
            started,
            release,
        }
    }

    fn with_classifier(classifier: Arc<dyn Classifier>, timeout: Duration) -> Self {
        Self::new(|b| b.with_guardrail(GuardrailPipeline::new(classifier).with_timeout(timeout)))
    }

    async fn send(&self, envelope: Value) -> DispatchOutcome {
        self.session.dispatch(&envelope.to_string()).await
    }

    async fn connect(&mut self) {
        self.send(status("CONNECTED")).await;
        self.drain();
    }

    fn drain(&mut self) -> Vec<OutboundCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    async fn item(&self, id: &str) -> TranscriptItem {
        self.session
            .snapshot()
            .await
            .items
            .into_iter()
            .find(|i| i.id == id)
            .unwrap()
    }

    async fn breadcrumbs(&self) -> Vec<TranscriptItem> {
        self.session
            .snapshot()
            .await
            .items
            .into_iter()
            .filter(|i| i.kind == ItemKind::Breadcrumb)
            .collect()
    }

    async fn active(&self) -> Option<String> {
        self.session.active_agent().await.map(|a| a.name.clone())
    }
}

fn status(status: &str) -> Value {
    json!({"type": "session.status", "status": status})
}

fn tool_call(call_id: &str, name: &str, arguments: Value) -> Value {
    json!({
        "type": "tool_call.requested",
        "call_id": call_id,
        "name": name,
        "arguments": arguments.to_string(),
    })
}

fn transfer(call_id: &str, target: &str) -> Value {
    tool_call(
        call_id,
        &format!("transfer_to_{}", target),
        json!({
            "rationale_for_transfer": "user asked",
            "conversation_context": "wants help",
            "destination_agent": target,
        }),
    )
}

fn created(item_id: &str, role: &str, text: Option<&str>) -> Value {
    let mut envelope = json!({"type": "conversation.item.created", "item_id": item_id, "role": role});
    if let Some(text) = text {
        envelope["text"] = json!(text);
    }
    envelope
}

fn done(item_id: &str, text: Option<&str>) -> Value {
    let mut envelope = json!({"type": "conversation.item.done", "item_id": item_id});
    if let Some(text) = text {
        envelope["text"] = json!(text);
    }
    envelope
}

fn tool_results(commands: &[OutboundCommand]) -> Vec<(String, Value)> {
    commands
        .iter()
        .filter_map(|c| match c {
            OutboundCommand::ToolCallResult { call_id, output } => Some((
                call_id.clone(),
                serde_json::from_str(output).unwrap_or_else(|_| json!(output)),
            )),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_connected_activates_default_agent_and_announces_tools() {
    let mut h = Harness::new(|b| b);
    assert_eq!(h.active().await, None);

    let outcome = h.send(status("CONNECTED")).await;
    assert_eq!(outcome.effect, Effect::StatusChanged(SessionStatus::Connected));
    assert_eq!(h.active().await.as_deref(), Some("a"));

    let commands = h.drain();
    let [OutboundCommand::SessionUpdate { agent, tools, .. }] = commands.as_slice() else {
        panic!("expected one session.update, got {:?}", commands);
    };
    assert_eq!(agent, "a");
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["fails", "gated", "checkout", "transfer_to_b"]);
}

#[tokio::test]
async fn test_credentials_gate_connection() {
    let h = Harness::new(|b| b);
    let err = h
        .session
        .connect(&StaticCredentials::rejected("expired token"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::Credentials(_)));
    assert!(err.is_fatal());
    assert_eq!(h.session.status().await, SessionStatus::Disconnected);

    h.session.connect(&StaticCredentials::valid("ek_123")).await.unwrap();
    assert_eq!(h.session.status().await, SessionStatus::Connecting);

    h.send(status("CONNECTED")).await;
    assert_eq!(h.session.status().await, SessionStatus::Connected);
}

#[tokio::test]
async fn test_transport_error_tears_down_session() {
    let mut h = Harness::new(|b| b);
    h.connect().await;

    let outcome = h.send(status("ERROR")).await;
    assert!(matches!(outcome.effect, Effect::TransportError(_)));
    assert_eq!(h.session.status().await, SessionStatus::Disconnected);
    assert_eq!(h.active().await, None);

    // Reconnecting starts again from the default agent
    h.send(status("CONNECTED")).await;
    assert_eq!(h.active().await.as_deref(), Some("a"));
}

// ---------------------------------------------------------------------------
// Handoffs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_handoff_a_to_b() {
    let mut h = Harness::new(|b| b);
    h.connect().await;

    let outcome = h.send(transfer("call_1", "b")).await;
    assert_eq!(
        outcome.effect,
        Effect::Handoff {
            from: "a".into(),
            to: "b".into()
        }
    );
    assert_eq!(h.active().await.as_deref(), Some("b"));

    let crumbs = h.breadcrumbs().await;
    assert_eq!(crumbs.len(), 1);
    assert_eq!(crumbs[0].title(), Some("Agent transfer: a -> b"));
    assert!(crumbs[0].is_done());
    assert_eq!(crumbs[0].tool_call.as_ref().unwrap().call_id, "call_1");

    let commands = h.drain();
    assert!(matches!(
        &commands[0],
        OutboundCommand::SessionUpdate { agent, .. } if agent == "b"
    ));
    let results = tool_results(&commands);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1["did_transfer"], true);
    assert_eq!(results[0].1["destination_agent"], "b");
    assert_eq!(commands.last(), Some(&OutboundCommand::ResponseCreate));

    // Subsequent calls resolve against b's tools
    let outcome = h.send(tool_call("call_2", "lookupOrders", json!({"phone": "555"}))).await;
    assert_eq!(outcome.effect, Effect::ToolScheduled("call_2".into()));
    h.session.wait_idle().await;
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    let results = tool_results(&h.drain());
    assert_eq!(results[0].0, "call_2");
    assert_eq!(results[0].1["echo"]["phone"], "555");

    // a's tools are no longer local
    let outcome = h.send(tool_call("call_3", "fails", json!({}))).await;
    assert_eq!(outcome.effect, Effect::ToolRemote("call_3".into()));
}

#[tokio::test]
async fn test_handoff_to_unlisted_agent_is_rejected() {
    let mut h = Harness::new(|b| b);
    h.connect().await;

    let outcome = h.send(transfer("call_1", "c")).await;
    assert_eq!(
        outcome.effect,
        Effect::HandoffRejected {
            from: "a".into(),
            to: "c".into()
        }
    );
    assert_eq!(h.active().await.as_deref(), Some("a"));

    let commands = h.drain();
    assert!(!commands
        .iter()
        .any(|c| matches!(c, OutboundCommand::SessionUpdate { .. })));
    let results = tool_results(&commands);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1["kind"], "InvalidHandoff");

    let crumbs = h.breadcrumbs().await;
    assert_eq!(crumbs[0].title(), Some("Transfer rejected: a -> c"));
    let call = crumbs[0].tool_call.as_ref().unwrap();
    assert!(call.result.as_ref().unwrap().is_error);
}

#[tokio::test]
async fn test_active_agent_stays_reachable() {
    let mut h = Harness::new(|b| b);
    h.connect().await;
    let reachable = h.session.registry().reachable_from("a");

    let targets = ["b", "c", "a", "a", "b", "b", "c", "ghost", "a", "b"];
    for (i, target) in targets.iter().enumerate() {
        h.send(transfer(&format!("call_{}", i), target)).await;
        let active = h.active().await.unwrap();
        assert!(reachable.contains(&active), "{} is not reachable", active);
    }
    assert_eq!(h.active().await.as_deref(), Some("b"));
}

#[tokio::test]
async fn test_transfer_before_connect_is_dropped() {
    let h = Harness::new(|b| b);
    let outcome = h.send(transfer("call_1", "b")).await;
    assert!(matches!(outcome.effect, Effect::Dropped(_)));
    assert_eq!(h.active().await, None);
}

// ---------------------------------------------------------------------------
// Tool execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_replayed_call_id_never_reinvokes_handler() {
    let mut h = Harness::new(|b| b);
    h.connect().await;
    h.send(transfer("t1", "b")).await;
    h.drain();

    let call = tool_call("call_1", "lookupOrders", json!({}));
    assert_eq!(h.send(call.clone()).await.effect, Effect::ToolScheduled("call_1".into()));
    // Duplicate while pending
    assert_eq!(h.send(call.clone()).await.effect, Effect::ToolDuplicate("call_1".into()));
    h.session.wait_idle().await;
    // Duplicate after resolution hands back the stored result
    let stored = h.session.executor().result_for("call_1").unwrap();
    assert_eq!(
        h.send(call).await.effect,
        Effect::ToolReplayed {
            call_id: "call_1".into(),
            result: stored,
        }
    );
    h.session.wait_idle().await;

    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    assert_eq!(tool_results(&h.drain()).len(), 1);

    // Duplicate transfer ids are not applied twice either
    match h.send(transfer("t1", "a")).await.effect {
        Effect::ToolReplayed { call_id, result } => {
            assert_eq!(call_id, "t1");
            assert_eq!(result.json().unwrap()["did_transfer"], true);
        }
        other => panic!("expected replay, got {:?}", other),
    }
    assert_eq!(h.active().await.as_deref(), Some("b"));
}

#[tokio::test]
async fn test_remote_tool_is_recorded_not_executed() {
    let mut h = Harness::new(|b| b);
    h.connect().await;

    let outcome = h.send(tool_call("call_1", "checkout", json!({"item_ids": ["101"]}))).await;
    assert_eq!(outcome.effect, Effect::ToolRemote("call_1".into()));

    let crumbs = h.breadcrumbs().await;
    assert_eq!(crumbs[0].title(), Some("function call: checkout"));
    assert!(crumbs[0].is_done());
    let call = crumbs[0].tool_call.as_ref().unwrap();
    assert!(call.remote);
    assert!(call.result.is_none());
    assert!(h.drain().is_empty());

    assert_eq!(
        h.send(json!({"type": "tool_call.result.sent", "call_id": "call_1"})).await.effect,
        Effect::ToolAcknowledged("call_1".into())
    );
    assert!(h.session.executor().is_acknowledged("call_1"));
}

#[tokio::test]
async fn test_handler_failure_is_a_structured_result() {
    let mut h = Harness::new(|b| b);
    h.connect().await;

    h.send(tool_call("call_1", "fails", json!({}))).await;
    h.session.wait_idle().await;

    let results = tool_results(&h.drain());
    assert_eq!(results[0].1["kind"], "ToolExecutionError");
    assert!(results[0].1["error"].as_str().unwrap().contains("inventory service down"));
    assert_eq!(h.session.status().await, SessionStatus::Connected);

    let crumbs = h.breadcrumbs().await;
    assert_eq!(crumbs[0].status, ItemStatus::Done);
}

#[tokio::test]
async fn test_disconnect_discards_late_tool_result() {
    let mut h = Harness::new(|b| b);
    h.connect().await;

    h.send(tool_call("call_1", "gated", json!({}))).await;
    h.started.notified().await;
    h.send(status("DISCONNECTED")).await;
    h.release.notify_one();
    h.session.wait_idle().await;

    assert!(tool_results(&h.drain()).is_empty());
    let crumbs = h.breadcrumbs().await;
    assert_eq!(crumbs[0].status, ItemStatus::InProgress);
    assert_eq!(h.session.executor().pending_calls(), vec!["call_1".to_string()]);
}

// ---------------------------------------------------------------------------
// Escalation
// ---------------------------------------------------------------------------

fn supervisor_registry() -> Arc<AgentRegistry> {
    Arc::new(
        AgentRegistry::builder()
            .agent(Agent::new("chatAgent", "Be quick").with_tool(supervisor_tool_spec()))
            .agent(Agent::new("supervisor", "Be right").with_tier(CapabilityTier::Escalated))
            .build()
            .unwrap(),
    )
}

async fn escalate_with(model: Arc<dyn SupervisorModel>) -> (Value, SessionStatus) {
    escalate(model, Duration::from_millis(50), |b| b).await
}

async fn escalate(
    model: Arc<dyn SupervisorModel>,
    deadline: Duration,
    configure: impl FnOnce(SessionBuilder) -> SessionBuilder,
) -> (Value, SessionStatus) {
    let registry = supervisor_registry();
    let coordinator = EscalationCoordinator::new(model, registry.clone()).with_deadline(deadline);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = configure(SessionBuilder::new(registry))
        .with_escalation(coordinator)
        .build(tx);

    session.dispatch(&status("CONNECTED").to_string()).await;
    let call = tool_call(
        "call_sup",
        SUPERVISOR_TOOL,
        json!({ (SUPERVISOR_CONTEXT_PARAM): "what plan am I on?" }),
    );
    assert_eq!(
        session.dispatch(&call.to_string()).await.effect,
        Effect::ToolScheduled("call_sup".into())
    );
    session.wait_idle().await;

    let mut commands = Vec::new();
    while let Ok(command) = rx.try_recv() {
        commands.push(command);
    }
    let results = tool_results(&commands);
    assert_eq!(results.len(), 1);
    (results[0].1.clone(), session.status().await)
}

#[tokio::test]
async fn test_escalation_deadline_returns_apology() {
    let (result, status) = escalate_with(Arc::new(SlowSupervisor)).await;
    assert_eq!(result, json!({"nextResponse": APOLOGY}));
    assert_eq!(status, SessionStatus::Connected);
}

#[tokio::test]
async fn test_escalation_deadline_wins_over_short_tool_timeout() {
    let (result, status) = escalate(Arc::new(SlowSupervisor), Duration::from_millis(200), |b| {
        b.with_tool_timeout(Duration::from_millis(50))
    })
    .await;
    assert_eq!(result, json!({"nextResponse": APOLOGY}));
    assert_eq!(status, SessionStatus::Connected);
}

#[tokio::test]
async fn test_escalation_relays_supervisor_text() {
    let (result, _) = escalate_with(Arc::new(QuickSupervisor)).await;
    assert_eq!(result["nextResponse"], "Your plan includes unlimited data.");
}

// ---------------------------------------------------------------------------
// Guardrail
// ---------------------------------------------------------------------------

async fn moderate(h: &Harness, id: &str, text: &str) -> DispatchOutcome {
    h.send(created(id, "assistant", None)).await;
    h.send(json!({"type": "conversation.item.delta", "item_id": id, "delta": text}))
        .await;
    let outcome = h.send(done(id, None)).await;
    h.session.wait_idle().await;
    outcome
}

#[tokio::test]
async fn test_violence_fails_guardrail() {
    let mut h = Harness::with_classifier(
        Arc::new(FixedClassifier(ModerationCategory::Violence)),
        Duration::from_secs(1),
    );
    h.connect().await;

    let outcome = moderate(&h, "a1", "something violent").await;
    assert_eq!(
        outcome.effect,
        Effect::ItemCompleted {
            id: "a1".into(),
            moderated: true
        }
    );

    let item = h.item("a1").await;
    let guardrail = item.guardrail.as_ref().unwrap();
    assert_eq!(guardrail.status, GuardrailStatus::Fail);
    assert_eq!(guardrail.category, Some(ModerationCategory::Violence));
    assert!(!item.is_safe_to_display());
}

#[tokio::test]
async fn test_guardrail_started_before_connect_settles() {
    let h = Harness::with_classifier(
        Arc::new(FixedClassifier(ModerationCategory::None)),
        Duration::from_secs(1),
    );
    h.send(status("CONNECTING")).await;
    assert_eq!(h.session.status().await, SessionStatus::Connecting);

    h.send(created("a1", "assistant", Some("Welcome to newTelco."))).await;
    let outcome = h.send(done("a1", None)).await;
    assert_eq!(
        outcome.effect,
        Effect::ItemCompleted {
            id: "a1".into(),
            moderated: true
        }
    );
    h.session.wait_idle().await;
    assert_eq!(h.item("a1").await.guardrail.unwrap().status, GuardrailStatus::Pass);

    h.send(status("CONNECTED")).await;
    let item = h.item("a1").await;
    assert_eq!(item.guardrail.as_ref().unwrap().status, GuardrailStatus::Pass);
    assert!(item.is_safe_to_display());
}

#[tokio::test]
async fn test_guardrail_started_while_disconnected_settles() {
    let h = Harness::with_classifier(
        Arc::new(FixedClassifier(ModerationCategory::OffBrand)),
        Duration::from_secs(1),
    );
    h.send(created("a1", "assistant", Some("Their network is better."))).await;
    h.send(done("a1", None)).await;
    h.session.wait_idle().await;

    let item = h.item("a1").await;
    assert_eq!(item.guardrail.as_ref().unwrap().status, GuardrailStatus::Fail);
    assert!(!item.is_safe_to_display());
}

#[tokio::test]
async fn test_clean_message_passes() {
    let mut h = Harness::with_classifier(
        Arc::new(FixedClassifier(ModerationCategory::None)),
        Duration::from_secs(1),
    );
    h.connect().await;
    moderate(&h, "a1", "Happy to help!").await;

    let item = h.item("a1").await;
    assert_eq!(item.guardrail.as_ref().unwrap().status, GuardrailStatus::Pass);
    assert!(item.is_safe_to_display());
}

#[tokio::test]
async fn test_classifier_timeout_fails_closed() {
    let mut h = Harness::with_classifier(Arc::new(SlowClassifier), Duration::from_millis(50));
    h.connect().await;
    moderate(&h, "a1", "hello").await;

    let item = h.item("a1").await;
    assert_eq!(item.guardrail.as_ref().unwrap().status, GuardrailStatus::Fail);
    assert!(!item.is_safe_to_display());
}

#[tokio::test]
async fn test_classifier_sees_trailing_window() {
    let classifier = Arc::new(RecordingClassifier::default());
    let mut h = Harness::with_classifier(classifier.clone(), Duration::from_secs(1));
    h.connect().await;

    for (i, text) in ["one", "two", "three", "four"].iter().enumerate() {
        let id = format!("u{}", i);
        h.send(created(&id, "user", Some(text))).await;
        h.send(done(&id, None)).await;
    }
    h.send(created("a1", "assistant", Some("reply"))).await;
    h.send(done("a1", None)).await;
    h.session.wait_idle().await;

    let seen = classifier.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "reply");
    let context: Vec<&str> = seen[0].1.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(context, vec!["two", "three", "four"]);
}

#[tokio::test]
async fn test_user_messages_are_not_moderated() {
    let classifier = Arc::new(RecordingClassifier::default());
    let mut h = Harness::with_classifier(classifier.clone(), Duration::from_secs(1));
    h.connect().await;

    h.send(created("u1", "user", None)).await;
    assert_eq!(h.item("u1").await.text(), Some(TRANSCRIBING));
    let outcome = h.send(done("u1", None)).await;
    assert_eq!(
        outcome.effect,
        Effect::ItemCompleted {
            id: "u1".into(),
            moderated: false
        }
    );
    h.session.wait_idle().await;

    assert_eq!(h.item("u1").await.text(), Some(INAUDIBLE));
    assert!(classifier.seen.lock().is_empty());
}

#[tokio::test]
async fn test_disconnect_during_classification_discards_result() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let classifier = Arc::new(GatedClassifier {
        started: started.clone(),
        release: release.clone(),
    });
    let mut h = Harness::with_classifier(classifier, Duration::from_secs(5));
    h.connect().await;

    h.send(created("a1", "assistant", Some("pending verdict"))).await;
    h.send(done("a1", None)).await;
    started.notified().await;

    h.send(status("DISCONNECTED")).await;
    let before = serde_json::to_value(h.session.snapshot().await.items).unwrap();

    release.notify_one();
    h.session.wait_idle().await;

    let after = serde_json::to_value(h.session.snapshot().await.items).unwrap();
    assert_eq!(before, after);
    let item = h.item("a1").await;
    assert_eq!(item.guardrail.as_ref().unwrap().status, GuardrailStatus::InProgress);
    assert!(!item.is_safe_to_display());
}

// ---------------------------------------------------------------------------
// Ordering and envelopes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sequence_numbers_strictly_increase() {
    let mut h = Harness::new(|b| b);
    h.connect().await;

    let envelopes = vec![
        created("u1", "user", Some("hi")).to_string(),
        "{not json".to_string(),
        json!({"type": "input_audio_buffer.speech_started"}).to_string(),
        done("u1", None).to_string(),
        tool_call("call_1", "checkout", json!({})).to_string(),
        created("a1", "assistant", Some("hello")).to_string(),
        json!({"type": "error", "message": "rate limited", "code": 429}).to_string(),
        done("a1", None).to_string(),
    ];

    let mut last = 0;
    let mut dropped = 0;
    for raw in &envelopes {
        let outcome = h.session.dispatch(raw).await;
        assert!(outcome.seq > last);
        last = outcome.seq;
        if matches!(outcome.effect, Effect::Dropped(_)) {
            dropped += 1;
        }
    }
    assert_eq!(dropped, 2);

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.last_seq, last);
    let seqs: Vec<u64> = snapshot.items.iter().map(|i| i.created_seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "{:?}", seqs);
    assert_eq!(snapshot.items.len(), 4);
    assert_eq!(snapshot.items[3].title(), Some("Channel error"));
}

#[tokio::test]
async fn test_event_dispatcher_survives_malformed_input() {
    let h = Harness::new(|b| b);
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (obs_tx, mut obs_rx) = mpsc::unbounded_channel();
    let dispatcher = EventDispatcher::new(h.session.clone()).with_observer(obs_tx);

    for raw in [
        status("CONNECTED").to_string(),
        "garbage".to_string(),
        created("u1", "user", Some("still here")).to_string(),
    ] {
        in_tx.send(raw).unwrap();
    }
    drop(in_tx);

    assert_eq!(dispatcher.run(in_rx).await, 3);

    let mut effects = Vec::new();
    while let Ok(outcome) = obs_rx.try_recv() {
        effects.push(outcome.effect);
    }
    assert!(matches!(effects[1], Effect::Dropped(_)));
    assert_eq!(effects[2], Effect::ItemCreated("u1".into()));
    // Stream closed: the session is torn down, transcript kept
    assert_eq!(h.session.status().await, SessionStatus::Disconnected);
    assert_eq!(h.item("u1").await.text(), Some("still here"));
}

#[tokio::test]
async fn test_send_user_text() {
    let mut h = Harness::new(|b| b);
    assert!(matches!(
        h.session.send_user_text("hello").await,
        Err(OrchestrationError::NotConnected)
    ));

    h.connect().await;
    let id = h.session.send_user_text("hello").await.unwrap();
    let item = h.item(&id).await;
    assert_eq!(item.kind, ItemKind::UserMessage);
    assert!(item.is_done());

    assert_eq!(
        h.drain(),
        vec![
            OutboundCommand::ConversationItemCreate {
                role: crate::channel::Role::User,
                text: "hello".into()
            },
            OutboundCommand::ResponseCreate,
        ]
    );
}

#[tokio::test]
async fn test_finalized_items_are_frozen() {
    let mut h = Harness::new(|b| b);
    h.connect().await;
    h.send(created("a1", "assistant", Some("final"))).await;
    h.send(done("a1", None)).await;

    let late_delta = h
        .send(json!({"type": "conversation.item.delta", "item_id": "a1", "delta": " edit"}))
        .await;
    assert!(matches!(late_delta.effect, Effect::Dropped(_)));
    assert!(matches!(h.send(done("a1", Some("other"))).await.effect, Effect::Dropped(_)));
    assert_eq!(h.item("a1").await.text(), Some("final"));
}
