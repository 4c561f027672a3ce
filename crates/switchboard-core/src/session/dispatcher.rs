//! Inbound event dispatch
//!
//! Every envelope gets the next sequence number and is applied to session
//! state while the session lock is held, so state transitions happen in
//! dispatch order. Slow work (tools, escalation, classification) is spawned
//! and never holds up the stream.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::handle::{Session, SessionState};
use super::SessionStatus;
use crate::agent::handoff::{rejection_result, transfer_target};
use crate::agent::Agent;
use crate::channel::{ChannelStatus, InboundEvent, Role};
use crate::tools::{Admission, Execution, ToolCall, ToolContext, ToolResult};
use crate::transcript::ItemKind;

/// The single effect an envelope had on the session
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Malformed, unrecognized or inapplicable envelope
    Dropped(String),
    StatusChanged(SessionStatus),
    /// Channel reported an error status; the session was torn down
    TransportError(String),
    ItemCreated(String),
    ItemUpdated(String),
    /// Message finalized; `moderated` if a guardrail classification started
    ItemCompleted { id: String, moderated: bool },
    Handoff { from: String, to: String },
    HandoffRejected { from: String, to: String },
    /// Local handler started
    ToolScheduled(String),
    /// No local handler; left to the remote side
    ToolRemote(String),
    /// Call id still pending or resolved remotely; nothing executed or re-sent
    ToolDuplicate(String),
    /// Call id already resolved locally; carries the stored result, which is
    /// not re-sent
    ToolReplayed { call_id: String, result: ToolResult },
    ToolAcknowledged(String),
    /// Non-fatal error event, recorded as a breadcrumb
    ChannelError(String),
}

/// Result of dispatching one envelope
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub seq: u64,
    pub effect: Effect,
}

impl Session {
    /// Apply one raw inbound envelope
    pub async fn dispatch(self: &Arc<Self>, raw: &str) -> DispatchOutcome {
        let mut state = self.lock().await;
        let seq = state.next_seq();
        let effect = match InboundEvent::parse(raw) {
            Ok(event) => {
                debug!(session = %self.id, seq, event = event.type_name(), "Dispatching envelope");
                self.route(&mut state, seq, event)
            }
            Err(e) => {
                warn!(session = %self.id, seq, "Dropping envelope: {}", e);
                Effect::Dropped(e.to_string())
            }
        };
        DispatchOutcome { seq, effect }
    }

    fn route(self: &Arc<Self>, state: &mut SessionState, seq: u64, event: InboundEvent) -> Effect {
        match event {
            InboundEvent::SessionStatus { status } => self.on_status(state, status),
            InboundEvent::ItemCreated { item_id, role, text } => {
                self.on_item_created(state, seq, item_id, role, text)
            }
            InboundEvent::ItemDelta { item_id, delta } => {
                match state.transcript.append_delta(&item_id, &delta) {
                    Ok(()) => Effect::ItemUpdated(item_id),
                    Err(e) => self.drop_envelope(seq, e),
                }
            }
            InboundEvent::ItemDone { item_id, text } => self.on_item_done(state, seq, item_id, text),
            InboundEvent::ToolCallRequested {
                call_id,
                name,
                arguments,
            } => self.on_tool_call(state, seq, ToolCall::new(call_id, name, arguments)),
            InboundEvent::ToolResultSent { call_id } => {
                if self.executor.acknowledge(&call_id) {
                    Effect::ToolAcknowledged(call_id)
                } else {
                    self.drop_envelope(seq, format!("unknown call id {}", call_id))
                }
            }
            InboundEvent::Error { message, code } => self.on_channel_error(state, seq, message, code),
        }
    }

    fn drop_envelope(&self, seq: u64, reason: impl std::fmt::Display) -> Effect {
        warn!(session = %self.id, seq, "Dropping envelope: {}", reason);
        Effect::Dropped(reason.to_string())
    }

    fn on_status(&self, state: &mut SessionState, status: ChannelStatus) -> Effect {
        match status {
            ChannelStatus::Connecting => {
                if state.status == SessionStatus::Disconnected {
                    state.status = SessionStatus::Connecting;
                }
                Effect::StatusChanged(state.status)
            }
            ChannelStatus::Connected => {
                if state.status != SessionStatus::Connected {
                    state.status = SessionStatus::Connected;
                    let agent = Arc::clone(state.handoff.initialize(self.registry.default_agent()));
                    info!(session = %self.id, agent = %agent.name, "Session connected");
                    self.announce(&agent);
                }
                Effect::StatusChanged(SessionStatus::Connected)
            }
            ChannelStatus::Disconnected => {
                self.teardown(state);
                Effect::StatusChanged(SessionStatus::Disconnected)
            }
            ChannelStatus::Error => {
                warn!(session = %self.id, "Channel reported transport error");
                self.teardown(state);
                Effect::TransportError("channel reported ERROR status".into())
            }
        }
    }

    fn on_item_created(
        &self,
        state: &mut SessionState,
        seq: u64,
        item_id: String,
        role: Role,
        text: Option<String>,
    ) -> Effect {
        match state.transcript.add_message(&item_id, role.into(), text, seq) {
            Ok(_) => Effect::ItemCreated(item_id),
            Err(e) => self.drop_envelope(seq, e),
        }
    }

    fn on_item_done(
        self: &Arc<Self>,
        state: &mut SessionState,
        seq: u64,
        item_id: String,
        text: Option<String>,
    ) -> Effect {
        let (kind, text) = match state.transcript.finalize(&item_id, text) {
            Ok(item) => (item.kind, item.text().unwrap_or_default().to_string()),
            Err(e) => return self.drop_envelope(seq, e),
        };

        let pipeline = match (&self.guardrail, kind) {
            (Some(pipeline), ItemKind::AssistantMessage) => Arc::clone(pipeline),
            _ => {
                return Effect::ItemCompleted {
                    id: item_id,
                    moderated: false,
                }
            }
        };

        if let Err(e) = state.transcript.begin_guardrail(&item_id) {
            warn!(session = %self.id, item = %item_id, "Guardrail not started: {}", e);
            return Effect::ItemCompleted {
                id: item_id,
                moderated: false,
            };
        }

        let context = state
            .transcript
            .message_window(&item_id, pipeline.context_window());
        let epoch = state.epoch;
        let token = self.cancellation_token();
        let session = Arc::clone(self);
        let id = item_id.clone();
        self.tasks.spawn(async move {
            let outcome = tokio::select! {
                outcome = pipeline.evaluate(&text, &context) => outcome,
                _ = token.cancelled() => {
                    debug!(session = %session.id, item = %id, "Classification cancelled");
                    return;
                }
            };
            session.complete_guardrail(epoch, &id, outcome).await;
        });

        Effect::ItemCompleted {
            id: item_id,
            moderated: true,
        }
    }

    fn on_tool_call(self: &Arc<Self>, state: &mut SessionState, seq: u64, call: ToolCall) -> Effect {
        let Some(agent) = state.handoff.active().cloned() else {
            return self.drop_envelope(seq, format!("no active agent for call {}", call.call_id));
        };

        match self.executor.admit(&call.call_id) {
            Admission::Fresh => {}
            Admission::Resolved(result) => {
                debug!(session = %self.id, seq, call_id = %call.call_id, "Resolved tool call replayed");
                return Effect::ToolReplayed {
                    call_id: call.call_id,
                    result,
                };
            }
            other => {
                debug!(session = %self.id, seq, call_id = %call.call_id, admission = ?other, "Duplicate tool call ignored");
                return Effect::ToolDuplicate(call.call_id);
            }
        }

        match transfer_target(&call.tool_name) {
            Some(target) => {
                let target = target.to_string();
                self.on_transfer(state, seq, &agent, call, &target)
            }
            None => self.on_function_call(state, seq, agent, call),
        }
    }

    fn on_transfer(
        &self,
        state: &mut SessionState,
        seq: u64,
        from: &Agent,
        call: ToolCall,
        target: &str,
    ) -> Effect {
        let call_id = call.call_id.clone();
        let arguments = call.arguments.clone();

        let (title, data, result, effect, next) = match state.handoff.transfer(&self.registry, target) {
            Ok(transition) => (
                format!("Agent transfer: {} -> {}", transition.from.name, transition.to.name),
                transition.breadcrumb_data(&arguments),
                transition.tool_result(),
                Effect::Handoff {
                    from: transition.from.name.clone(),
                    to: transition.to.name.clone(),
                },
                Some(Arc::clone(&transition.to)),
            ),
            Err(e) => (
                format!("Transfer rejected: {} -> {}", from.name, target),
                json!({
                    "from": from.name,
                    "to": target,
                    "error": e.to_string(),
                }),
                rejection_result(&e),
                Effect::HandoffRejected {
                    from: from.name.clone(),
                    to: target.to_string(),
                },
                None,
            ),
        };

        match state.transcript.add_tool_breadcrumb(title, Some(data), call, seq) {
            Ok(crumb) => {
                if let Err(e) = state.transcript.resolve_tool_call(&crumb, Some(result.clone())) {
                    warn!(session = %self.id, call_id = %call_id, "Transfer breadcrumb not resolved: {}", e);
                }
            }
            Err(e) => warn!(session = %self.id, call_id = %call_id, "Transfer breadcrumb not recorded: {}", e),
        }

        if let Some(agent) = next {
            self.announce(&agent);
        }
        self.executor.settle(&call_id, result.clone());
        self.outbound.send_tool_result(&call_id, &result);
        self.outbound.request_response();
        effect
    }

    fn on_function_call(
        self: &Arc<Self>,
        state: &mut SessionState,
        seq: u64,
        agent: Arc<Agent>,
        call: ToolCall,
    ) -> Effect {
        let call_id = call.call_id.clone();
        let local = self.executor.resolves_locally(&agent, &call.tool_name);
        let title = format!("function call: {}", call.tool_name);

        let crumb = match state.transcript.add_tool_breadcrumb(title, None, call.clone(), seq) {
            Ok(crumb) => crumb,
            Err(e) => return self.drop_envelope(seq, e),
        };

        if !local {
            self.executor.mark_remote(&call_id);
            if let Err(e) = state.transcript.resolve_tool_call(&crumb, None) {
                warn!(session = %self.id, call_id = %call_id, "Remote call breadcrumb not resolved: {}", e);
            }
            info!(
                session = %self.id,
                call_id = %call_id,
                tool = %call.tool_name,
                agent = %agent.name,
                "Tool call left to remote side"
            );
            return Effect::ToolRemote(call_id);
        }

        let ctx = ToolContext::new(&self.id, &call_id)
            .with_agent(&agent.name)
            .with_history(state.transcript.message_lines())
            .with_cancellation(self.cancellation_token());
        let epoch = state.epoch;
        let session = Arc::clone(self);
        self.tasks.spawn(async move {
            match session.executor.run(&agent, &call, ctx).await {
                Execution::Local(result) => {
                    session
                        .complete_tool_call(epoch, &call.call_id, &crumb, result)
                        .await
                }
                Execution::Remote => {
                    session.executor.mark_remote(&call.call_id);
                }
            }
        });

        Effect::ToolScheduled(call_id)
    }

    fn on_channel_error(
        &self,
        state: &mut SessionState,
        seq: u64,
        message: String,
        code: Option<Value>,
    ) -> Effect {
        warn!(session = %self.id, seq, code = ?code, "Channel error: {}", message);
        let data = json!({ "message": message, "code": code });
        if let Err(e) = state.transcript.add_breadcrumb("Channel error", Some(data), seq) {
            warn!(session = %self.id, seq, "Error breadcrumb not recorded: {}", e);
        }
        Effect::ChannelError(message)
    }
}

/// Drives a session from an ordered inbound stream of raw envelopes
pub struct EventDispatcher {
    session: Arc<Session>,
    observer: Option<mpsc::UnboundedSender<DispatchOutcome>>,
}

impl EventDispatcher {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            observer: None,
        }
    }

    /// Receive every dispatch outcome
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<DispatchOutcome>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Process envelopes until the stream closes, then tear the session
    /// down. Returns the number of envelopes processed.
    pub async fn run(self, mut inbound: mpsc::UnboundedReceiver<String>) -> u64 {
        let mut processed = 0u64;
        while let Some(raw) = inbound.recv().await {
            let outcome = self.session.dispatch(&raw).await;
            processed += 1;
            if let Some(observer) = &self.observer {
                // Observer going away does not stop dispatch
                let _ = observer.send(outcome);
            }
        }
        info!(session = %self.session.id(), processed, "Inbound stream closed");
        self.session.disconnect().await;
        processed
    }
}
