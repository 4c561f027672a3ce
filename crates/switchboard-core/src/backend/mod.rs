//! HTTP collaborators
//!
//! A Responses-API client plus the supervisor model and guardrail
//! classifier built on it. Both speak plain JSON over `reqwest`; nothing
//! here streams.

mod classifier;
mod client;
mod supervisor;

pub use classifier::ResponsesClassifier;
pub use client::ResponsesClient;
pub use supervisor::ResponsesSupervisor;
