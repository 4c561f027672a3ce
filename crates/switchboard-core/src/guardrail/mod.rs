//! Guardrail classification of finalized assistant messages
//!
//! When an assistant message reaches Done, its text (plus a short trailing
//! window of prior conversation) is sent to a [`Classifier`]. The pipeline is
//! fail-closed: a classifier error or timeout yields `Fail`, never `Pass`.

mod pipeline;
mod result;

pub use pipeline::{Classification, Classifier, GuardrailPipeline};
pub use result::{GuardrailResult, GuardrailStatus, ModerationCategory};
