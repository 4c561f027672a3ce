//! Transcript item types

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::guardrail::GuardrailResult;
use crate::tools::ToolCall;

/// What kind of entry an item is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    UserMessage,
    AssistantMessage,
    Breadcrumb,
}

impl ItemKind {
    /// Conversation role for message kinds
    pub fn role(&self) -> Option<&'static str> {
        match self {
            ItemKind::UserMessage => Some("user"),
            ItemKind::AssistantMessage => Some("assistant"),
            ItemKind::Breadcrumb => None,
        }
    }

    pub fn from_role(role: &str) -> Option<Self> {
        match role {
            "user" => Some(ItemKind::UserMessage),
            "assistant" => Some(ItemKind::AssistantMessage),
            _ => None,
        }
    }
}

/// Two-state item lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    InProgress,
    Done,
}

/// Item content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemPayload {
    Text { text: String },
    Breadcrumb { title: String, data: Option<Value> },
}

/// A single ordered transcript entry
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptItem {
    pub id: String,
    pub kind: ItemKind,
    pub status: ItemStatus,
    pub payload: ItemPayload,
    /// Session sequence number of the envelope that created this item
    pub created_seq: u64,
    pub created_at: DateTime<Utc>,
    /// Tool call recorded by this breadcrumb, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    /// Moderation state of an assistant message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardrail: Option<GuardrailResult>,
    /// Text is a placeholder awaiting transcription
    #[serde(skip)]
    pub(crate) placeholder: bool,
}

impl TranscriptItem {
    pub fn message(id: impl Into<String>, kind: ItemKind, text: impl Into<String>, seq: u64) -> Self {
        Self {
            id: id.into(),
            kind,
            status: ItemStatus::InProgress,
            payload: ItemPayload::Text { text: text.into() },
            created_seq: seq,
            created_at: Utc::now(),
            tool_call: None,
            guardrail: None,
            placeholder: false,
        }
    }

    pub fn breadcrumb(title: impl Into<String>, data: Option<Value>, seq: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: ItemKind::Breadcrumb,
            status: ItemStatus::Done,
            payload: ItemPayload::Breadcrumb {
                title: title.into(),
                data,
            },
            created_seq: seq,
            created_at: Utc::now(),
            tool_call: None,
            guardrail: None,
            placeholder: false,
        }
    }

    /// Message text, or `None` for breadcrumbs
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            ItemPayload::Text { text } => Some(text),
            ItemPayload::Breadcrumb { .. } => None,
        }
    }

    /// Breadcrumb title, or `None` for messages
    pub fn title(&self) -> Option<&str> {
        match &self.payload {
            ItemPayload::Breadcrumb { title, .. } => Some(title),
            ItemPayload::Text { .. } => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == ItemStatus::Done
    }

    pub fn is_message(&self) -> bool {
        self.kind != ItemKind::Breadcrumb
    }

    /// Whether a UI may present this item as verified content.
    ///
    /// Assistant messages are only safe once their guardrail passed;
    /// everything else is safe once Done.
    pub fn is_safe_to_display(&self) -> bool {
        match self.kind {
            ItemKind::AssistantMessage => self
                .guardrail
                .as_ref()
                .is_some_and(|g| g.is_safe_to_display()),
            _ => self.is_done(),
        }
    }

    /// Role/text pair for model context
    pub fn as_line(&self) -> Option<MessageLine> {
        let role = self.kind.role()?;
        Some(MessageLine {
            role,
            text: self.text().unwrap_or_default().to_string(),
        })
    }
}

/// A message reduced to role and text, used as model context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageLine {
    pub role: &'static str,
    pub text: String,
}
