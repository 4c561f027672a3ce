//! Concurrent sessions sharing one agent registry

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;

use super::handle::{Session, SessionBuilder};
use crate::channel::OutboundCommand;
use crate::error::OrchestrationError;

/// Manager for all live sessions
pub struct SessionManager {
    /// Template every session is built from
    builder: SessionBuilder,
    /// Active sessions indexed by session ID
    sessions: DashMap<String, Arc<Session>>,
    /// Counter for generating session IDs
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(builder: SessionBuilder) -> Self {
        Self {
            builder,
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new session whose commands go to `outbound`
    pub fn create_session(&self, outbound: mpsc::UnboundedSender<OutboundCommand>) -> Arc<Session> {
        let id = format!("session-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let session = self.builder.build_with_id(id.clone(), outbound);

        info!(session = %id, "Created session");
        self.sessions.insert(id, Arc::clone(&session));
        session
    }

    /// Get an existing session
    pub fn get_session(&self, id: &str) -> Result<Arc<Session>, OrchestrationError> {
        self.sessions
            .get(id)
            .map(|s| Arc::clone(&s))
            .ok_or_else(|| OrchestrationError::SessionNotFound(id.to_string()))
    }

    pub fn has_session(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Disconnect and forget a session
    pub async fn remove_session(&self, id: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(id)?;
        session.disconnect().await;
        info!(session = %id, "Removed session");
        Some(session)
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Disconnect every session
    pub async fn disconnect_all(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.iter().map(|e| Arc::clone(e.value())).collect();
        for session in sessions {
            session.disconnect().await;
        }
    }
}
