//! Ordered transcript storage

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::item::{ItemKind, ItemPayload, ItemStatus, MessageLine, TranscriptItem};
use crate::constants::transcript::{INAUDIBLE, TRANSCRIBING};
use crate::guardrail::GuardrailResult;
use crate::tools::{ToolCall, ToolResult};

/// Transcript error type
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("item already exists: {0}")]
    DuplicateItem(String),

    #[error("item not found: {0}")]
    UnknownItem(String),

    #[error("item is finalized: {0}")]
    Finalized(String),

    #[error("sequence {got} does not follow {last}")]
    SequenceRegression { last: u64, got: u64 },

    #[error("item is not a message: {0}")]
    NotAMessage(String),

    #[error("item carries no tool call: {0}")]
    NoToolCall(String),
}

/// Append-only, ordered log of messages and breadcrumbs
#[derive(Debug, Default, Clone)]
pub struct TranscriptStore {
    items: Vec<TranscriptItem>,
    index: HashMap<String, usize>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item. Sequence numbers must be strictly increasing.
    pub fn append(&mut self, item: TranscriptItem) -> Result<&TranscriptItem, TranscriptError> {
        if self.index.contains_key(&item.id) {
            return Err(TranscriptError::DuplicateItem(item.id));
        }
        if let Some(last) = self.items.last() {
            if item.created_seq <= last.created_seq {
                return Err(TranscriptError::SequenceRegression {
                    last: last.created_seq,
                    got: item.created_seq,
                });
            }
        }

        debug!(id = %item.id, seq = item.created_seq, kind = ?item.kind, "Transcript append");
        let pos = self.items.len();
        self.index.insert(item.id.clone(), pos);
        self.items.push(item);
        Ok(&self.items[pos])
    }

    /// Append a new in-progress message.
    ///
    /// A user message created without text shows a transcription placeholder
    /// until the first delta arrives.
    pub fn add_message(
        &mut self,
        id: &str,
        kind: ItemKind,
        text: Option<String>,
        seq: u64,
    ) -> Result<&TranscriptItem, TranscriptError> {
        if kind == ItemKind::Breadcrumb {
            return Err(TranscriptError::NotAMessage(id.to_string()));
        }
        let text = text.unwrap_or_default();
        let placeholder = kind == ItemKind::UserMessage && text.is_empty();
        let mut item = TranscriptItem::message(
            id,
            kind,
            if placeholder { TRANSCRIBING.to_string() } else { text },
            seq,
        );
        item.placeholder = placeholder;
        self.append(item)
    }

    /// Append a finished breadcrumb, returning its id
    pub fn add_breadcrumb(
        &mut self,
        title: impl Into<String>,
        data: Option<Value>,
        seq: u64,
    ) -> Result<String, TranscriptError> {
        let item = TranscriptItem::breadcrumb(title, data, seq);
        Ok(self.append(item)?.id.clone())
    }

    /// Append an in-progress breadcrumb owning a tool call, returning its id.
    /// The breadcrumb data defaults to the call arguments.
    pub fn add_tool_breadcrumb(
        &mut self,
        title: impl Into<String>,
        data: Option<Value>,
        call: ToolCall,
        seq: u64,
    ) -> Result<String, TranscriptError> {
        let data = data.or_else(|| Some(call.arguments.clone()));
        let mut item = TranscriptItem::breadcrumb(title, data, seq);
        item.status = ItemStatus::InProgress;
        item.tool_call = Some(call);
        Ok(self.append(item)?.id.clone())
    }

    /// Append streamed text to an in-progress message
    pub fn append_delta(&mut self, id: &str, delta: &str) -> Result<(), TranscriptError> {
        let item = self.get_mut(id)?;
        if item.is_done() {
            return Err(TranscriptError::Finalized(id.to_string()));
        }
        let placeholder = std::mem::take(&mut item.placeholder);
        match &mut item.payload {
            ItemPayload::Text { text } => {
                if placeholder {
                    text.clear();
                }
                text.push_str(delta);
                Ok(())
            }
            ItemPayload::Breadcrumb { .. } => Err(TranscriptError::NotAMessage(id.to_string())),
        }
    }

    /// Transition a message to Done, optionally replacing its text with the
    /// final transcript.
    pub fn finalize(
        &mut self,
        id: &str,
        final_text: Option<String>,
    ) -> Result<&TranscriptItem, TranscriptError> {
        let item = self.get_mut(id)?;
        if item.is_done() {
            return Err(TranscriptError::Finalized(id.to_string()));
        }
        let kind = item.kind;
        let placeholder = std::mem::take(&mut item.placeholder);
        match &mut item.payload {
            ItemPayload::Text { text } => {
                if let Some(final_text) = final_text {
                    *text = final_text;
                } else if placeholder {
                    text.clear();
                }
                if kind == ItemKind::UserMessage && text.trim().is_empty() {
                    *text = INAUDIBLE.to_string();
                }
            }
            ItemPayload::Breadcrumb { .. } => {
                return Err(TranscriptError::NotAMessage(id.to_string()));
            }
        }
        item.status = ItemStatus::Done;
        Ok(&*item)
    }

    /// Record the outcome of the tool call owned by a breadcrumb and mark it
    /// Done. `None` records a call resolved by the remote side.
    pub fn resolve_tool_call(
        &mut self,
        id: &str,
        result: Option<ToolResult>,
    ) -> Result<(), TranscriptError> {
        let item = self.get_mut(id)?;
        if item.is_done() {
            return Err(TranscriptError::Finalized(id.to_string()));
        }
        let call = item
            .tool_call
            .as_mut()
            .ok_or_else(|| TranscriptError::NoToolCall(id.to_string()))?;
        match result {
            Some(result) => {
                call.resolve(result);
            }
            None => call.mark_remote(),
        }
        item.status = ItemStatus::Done;
        Ok(())
    }

    /// Attach an in-progress guardrail result to a finalized assistant message
    pub fn begin_guardrail(&mut self, id: &str) -> Result<(), TranscriptError> {
        let item = self.get_mut(id)?;
        if item.kind != ItemKind::AssistantMessage {
            return Err(TranscriptError::NotAMessage(id.to_string()));
        }
        if item.guardrail.is_none() {
            item.guardrail = Some(GuardrailResult::pending());
        }
        Ok(())
    }

    /// Settle a pending guardrail. Returns `false` if it was already terminal.
    pub fn settle_guardrail(
        &mut self,
        id: &str,
        outcome: GuardrailResult,
    ) -> Result<bool, TranscriptError> {
        let item = self.get_mut(id)?;
        let guardrail = item.guardrail.get_or_insert_with(GuardrailResult::pending);
        Ok(guardrail.settle(outcome))
    }

    pub fn get(&self, id: &str) -> Option<&TranscriptItem> {
        self.index.get(id).map(|&pos| &self.items[pos])
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut TranscriptItem, TranscriptError> {
        let pos = *self
            .index
            .get(id)
            .ok_or_else(|| TranscriptError::UnknownItem(id.to_string()))?;
        Ok(&mut self.items[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn items(&self) -> &[TranscriptItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Highest sequence number recorded so far
    pub fn last_seq(&self) -> Option<u64> {
        self.items.last().map(|i| i.created_seq)
    }

    /// All messages as role/text lines, in order
    pub fn message_lines(&self) -> Vec<MessageLine> {
        self.items.iter().filter_map(|i| i.as_line()).collect()
    }

    /// Up to `n` messages immediately preceding item `id`
    pub fn message_window(&self, id: &str, n: usize) -> Vec<MessageLine> {
        let Some(&pos) = self.index.get(id) else {
            return Vec::new();
        };
        let mut window: Vec<MessageLine> = self.items[..pos]
            .iter()
            .rev()
            .filter_map(|i| i.as_line())
            .take(n)
            .collect();
        window.reverse();
        window
    }
}
