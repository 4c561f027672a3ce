//! Append-only conversation transcript
//!
//! Items are only ever appended and status-transitioned
//! (`InProgress -> Done`); once an item is Done its payload is frozen.
//! Breadcrumbs record system events such as agent transfers and tool calls.

mod item;
mod store;

pub use item::{ItemKind, ItemPayload, ItemStatus, MessageLine, TranscriptItem};
pub use store::{TranscriptError, TranscriptStore};
