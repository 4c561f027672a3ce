//! Classification pipeline with fail-closed semantics

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::result::{GuardrailResult, ModerationCategory};
use crate::constants;
use crate::error::OrchestrationError;
use crate::transcript::MessageLine;

/// Classifier verdict for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: ModerationCategory,
    pub rationale: Option<String>,
}

impl Classification {
    pub fn new(category: ModerationCategory) -> Self {
        Self {
            category,
            rationale: None,
        }
    }
}

/// External classifier service: `classify(text, context) -> category`
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str, context: &[MessageLine]) -> anyhow::Result<Classification>;
}

/// Runs a classifier under a deadline and maps its answer to a terminal
/// guardrail result
pub struct GuardrailPipeline {
    classifier: Arc<dyn Classifier>,
    timeout: Duration,
    context_window: usize,
}

impl GuardrailPipeline {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier,
            timeout: constants::timeouts::CLASSIFICATION,
            context_window: constants::guardrail::CONTEXT_WINDOW,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_context_window(mut self, n: usize) -> Self {
        self.context_window = n;
        self
    }

    /// Number of prior messages to send as context
    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Classify a finalized message. Always returns a terminal result.
    pub async fn evaluate(&self, text: &str, context: &[MessageLine]) -> GuardrailResult {
        match tokio::time::timeout(self.timeout, self.classifier.classify(text, context)).await {
            Ok(Ok(classification)) => {
                debug!(category = %classification.category, "Guardrail classified message");
                GuardrailResult::classified(classification.category, classification.rationale)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Guardrail classifier failed, failing closed");
                GuardrailResult::failed(OrchestrationError::Classification(e.to_string()).to_string())
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Guardrail classifier timed out, failing closed"
                );
                GuardrailResult::failed(
                    OrchestrationError::Classification(format!(
                        "timed out after {}ms",
                        self.timeout.as_millis()
                    ))
                    .to_string(),
                )
            }
        }
    }
}
