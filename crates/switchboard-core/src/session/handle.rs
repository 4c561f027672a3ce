//! Session handle, state and builder

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::SessionStatus;
use crate::agent::{Agent, AgentRegistry, HandoffState};
use crate::channel::{CommandSender, CredentialProvider, OutboundCommand, TokenStatus};
use crate::constants;
use crate::error::OrchestrationError;
use crate::escalation::{EscalationCoordinator, SupervisorTool};
use crate::guardrail::{GuardrailPipeline, GuardrailResult};
use crate::tools::{ToolExecutor, ToolRegistry, ToolResult};
use crate::transcript::{ItemKind, TranscriptItem, TranscriptStore};

/// Mutable session state. Only touched while holding the session lock.
#[derive(Debug, Default)]
pub(super) struct SessionState {
    pub(super) status: SessionStatus,
    pub(super) handoff: HandoffState,
    /// Last sequence number handed out
    pub(super) seq: u64,
    pub(super) transcript: TranscriptStore,
    /// Bumped on every teardown; late task results carry the epoch they
    /// started in
    pub(super) epoch: u64,
}

impl SessionState {
    pub(super) fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Whether a task started in `epoch` may still mutate state. Only a
    /// teardown bumps the epoch; status changes without one keep results.
    pub(super) fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }
}

/// Point-in-time view of a session for UI consumers
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub status: SessionStatus,
    pub active_agent: Option<String>,
    pub last_seq: u64,
    pub items: Vec<TranscriptItem>,
}

/// A live conversation
pub struct Session {
    pub(super) id: String,
    pub(super) registry: Arc<AgentRegistry>,
    pub(super) executor: Arc<ToolExecutor>,
    pub(super) guardrail: Option<Arc<GuardrailPipeline>>,
    pub(super) outbound: CommandSender,
    pub(super) state: Mutex<SessionState>,
    /// Replaced on every teardown so a reconnect starts with a live token
    cancellation: RwLock<CancellationToken>,
    pub(super) tasks: TaskTracker,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status
    }

    pub async fn active_agent(&self) -> Option<Arc<Agent>> {
        self.state.lock().await.handoff.active().cloned()
    }

    pub(super) async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Token cancelled when the current connection is torn down
    pub(super) fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.read().clone()
    }

    /// Validate credentials and move to CONNECTING. The session becomes
    /// CONNECTED when the channel reports it.
    pub async fn connect(&self, credentials: &dyn CredentialProvider) -> Result<(), OrchestrationError> {
        {
            let mut state = self.lock().await;
            if state.status != SessionStatus::Disconnected {
                debug!(session = %self.id, status = %state.status, "Connect ignored");
                return Ok(());
            }
            state.status = SessionStatus::Connecting;
        }

        let verdict = credentials.token().await;

        let mut state = self.lock().await;
        match verdict {
            Ok(TokenStatus::Valid(_)) => {
                info!(session = %self.id, "Credentials accepted");
                Ok(())
            }
            Ok(TokenStatus::Rejected(reason)) => {
                warn!(session = %self.id, reason = %reason, "Credentials rejected");
                self.teardown(&mut state);
                Err(OrchestrationError::Credentials(reason))
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "Credential provider failed");
                self.teardown(&mut state);
                Err(OrchestrationError::Transport(e.to_string()))
            }
        }
    }

    /// Tear down the connection. The transcript is kept.
    pub async fn disconnect(&self) {
        let mut state = self.lock().await;
        self.teardown(&mut state);
    }

    /// Drop connection state: cancel in-flight tasks, bump the epoch and
    /// return the handoff machine to its uninitialized state
    pub(super) fn teardown(&self, state: &mut SessionState) {
        if state.status == SessionStatus::Disconnected && state.handoff.active().is_none() {
            return;
        }
        state.status = SessionStatus::Disconnected;
        state.epoch += 1;
        state.handoff.reset();
        let previous = std::mem::replace(&mut *self.cancellation.write(), CancellationToken::new());
        previous.cancel();

        let pending = self.executor.pending_calls();
        info!(
            session = %self.id,
            epoch = state.epoch,
            unresolved_calls = pending.len(),
            "Session disconnected"
        );
    }

    /// Announce `agent` and its tools to the channel
    pub(super) fn announce(&self, agent: &Agent) {
        self.outbound
            .send_session_update(agent, self.registry.session_tools(agent));
    }

    /// Inject a typed user message and ask the remote model to respond
    pub async fn send_user_text(&self, text: &str) -> Result<String, OrchestrationError> {
        let mut state = self.lock().await;
        if state.status != SessionStatus::Connected {
            return Err(OrchestrationError::NotConnected);
        }
        let seq = state.next_seq();
        let id = uuid::Uuid::new_v4().to_string();
        state
            .transcript
            .add_message(&id, ItemKind::UserMessage, Some(text.to_string()), seq)?;
        state.transcript.finalize(&id, None)?;

        self.outbound.send_user_text(text);
        self.outbound.request_response();
        debug!(session = %self.id, seq, "User text sent");
        Ok(id)
    }

    /// Apply a local tool result unless the connection it belongs to is gone
    pub(super) async fn complete_tool_call(
        &self,
        epoch: u64,
        call_id: &str,
        breadcrumb_id: &str,
        result: ToolResult,
    ) {
        let mut state = self.lock().await;
        if !state.is_current(epoch) {
            debug!(session = %self.id, call_id = %call_id, "Discarding stale tool result");
            return;
        }
        if !self.executor.settle(call_id, result.clone()) {
            return;
        }
        if let Err(e) = state.transcript.resolve_tool_call(breadcrumb_id, Some(result.clone())) {
            warn!(session = %self.id, call_id = %call_id, "Tool breadcrumb not updated: {}", e);
        }
        info!(
            session = %self.id,
            call_id = %call_id,
            is_error = result.is_error,
            "Tool call resolved"
        );
        self.outbound.send_tool_result(call_id, &result);
        self.outbound.request_response();
    }

    /// Apply a guardrail verdict unless the connection it belongs to is gone
    pub(super) async fn complete_guardrail(&self, epoch: u64, item_id: &str, outcome: GuardrailResult) {
        let mut state = self.lock().await;
        if !state.is_current(epoch) {
            debug!(session = %self.id, item = %item_id, "Discarding stale guardrail result");
            return;
        }
        let status = outcome.status;
        match state.transcript.settle_guardrail(item_id, outcome) {
            Ok(true) => info!(session = %self.id, item = %item_id, status = ?status, "Guardrail settled"),
            Ok(false) => debug!(session = %self.id, item = %item_id, "Guardrail already settled"),
            Err(e) => warn!(session = %self.id, item = %item_id, "Guardrail not recorded: {}", e),
        }
    }

    /// Current state for display
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock().await;
        SessionSnapshot {
            id: self.id.clone(),
            status: state.status,
            active_agent: state.handoff.active_name().map(str::to_string),
            last_seq: state.seq,
            items: state.transcript.items().to_vec(),
        }
    }

    /// Wait for every spawned tool, escalation and classification task
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

/// Builder for [`Session`]. Cheap to clone; shared pieces are `Arc`s.
#[derive(Clone)]
pub struct SessionBuilder {
    registry: Arc<AgentRegistry>,
    tools: Arc<ToolRegistry>,
    guardrail: Option<Arc<GuardrailPipeline>>,
    tool_timeout: Duration,
    id: Option<String>,
}

impl SessionBuilder {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            tools: Arc::new(ToolRegistry::new()),
            guardrail: None,
            tool_timeout: constants::timeouts::TOOL_EXECUTION,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Local tool handlers
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        Arc::make_mut(&mut self.tools).extend(tools);
        self
    }

    /// Register the supervisor tool backed by `coordinator`
    pub fn with_escalation(mut self, coordinator: EscalationCoordinator) -> Self {
        Arc::make_mut(&mut self.tools).register(Arc::new(SupervisorTool::new(Arc::new(coordinator))));
        self
    }

    pub fn with_guardrail(mut self, pipeline: GuardrailPipeline) -> Self {
        self.guardrail = Some(Arc::new(pipeline));
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Build a session sending its commands to `outbound`
    pub fn build(&self, outbound: mpsc::UnboundedSender<OutboundCommand>) -> Arc<Session> {
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.build_with_id(id, outbound)
    }

    pub(super) fn build_with_id(
        &self,
        id: String,
        outbound: mpsc::UnboundedSender<OutboundCommand>,
    ) -> Arc<Session> {
        if self.guardrail.is_none() {
            warn!(session = %id, "No guardrail configured; assistant messages stay unverified");
        }
        let executor = ToolExecutor::new(Arc::clone(&self.tools)).with_timeout(self.tool_timeout);
        Arc::new(Session {
            outbound: CommandSender::new(id.clone(), outbound),
            id,
            registry: Arc::clone(&self.registry),
            executor: Arc::new(executor),
            guardrail: self.guardrail.clone(),
            state: Mutex::new(SessionState::default()),
            cancellation: RwLock::new(CancellationToken::new()),
            tasks: TaskTracker::new(),
        })
    }
}
