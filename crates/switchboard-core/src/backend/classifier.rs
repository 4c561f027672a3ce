//! Guardrail classifier over the Responses API

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::client::{output_text, ResponsesClient};
use crate::constants;
use crate::guardrail::{Classification, Classifier, ModerationCategory};
use crate::transcript::MessageLine;

/// Structured verdict the model is asked to produce
#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(rename = "moderationRationale")]
    rationale: String,
    #[serde(rename = "moderationCategory")]
    category: ModerationCategory,
}

pub struct ResponsesClassifier {
    client: Arc<ResponsesClient>,
    model: String,
    company_name: String,
}

impl ResponsesClassifier {
    pub fn new(client: Arc<ResponsesClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            company_name: constants::guardrail::COMPANY_NAME.to_string(),
        }
    }

    /// Brand the OFF_BRAND category is judged against
    pub fn with_company_name(mut self, name: impl Into<String>) -> Self {
        self.company_name = name.into();
        self
    }
}

#[async_trait]
impl Classifier for ResponsesClassifier {
    async fn classify(&self, text: &str, context: &[MessageLine]) -> Result<Classification> {
        let body = request_body(&self.model, &prompt(&self.company_name, text, context));
        let response = self.client.create(&body).await?;
        parse_verdict(&response)
    }
}

fn prompt(company_name: &str, text: &str, context: &[MessageLine]) -> String {
    let history = context
        .iter()
        .map(|line| format!("{}: {}", line.role, line.text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are classifying a message spoken by a customer service agent for {company}. \
Decide whether it should be shown to the customer.\n\n\
Categories:\n\
- OFFENSIVE: hateful, harassing or demeaning language\n\
- OFF_BRAND: disparages {company}, praises competitors or strays far from the role\n\
- VIOLENCE: threats, incitement or graphic violence\n\
- NONE: none of the above\n\n\
Recent conversation:\n{history}\n\n\
Message to classify:\n<message>{text}</message>\n\n\
Give a one or two sentence rationale, then the category.",
        company = company_name,
        history = if history.is_empty() { "(none)".to_string() } else { history },
        text = text,
    )
}

fn verdict_schema() -> Value {
    let categories: Vec<&str> = ModerationCategory::ALL.iter().map(|c| c.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "moderationRationale": {"type": "string"},
            "moderationCategory": {"type": "string", "enum": categories},
        },
        "required": ["moderationRationale", "moderationCategory"],
        "additionalProperties": false,
    })
}

fn request_body(model: &str, prompt: &str) -> Value {
    json!({
        "model": model,
        "input": [{"role": "user", "content": prompt}],
        "text": {
            "format": {
                "type": "json_schema",
                "name": "output_classification",
                "schema": verdict_schema(),
                "strict": true,
            }
        },
    })
}

fn parse_verdict(body: &Value) -> Result<Classification> {
    let text = output_text(body);
    let verdict: Verdict =
        serde_json::from_str(&text).with_context(|| format!("Unparseable classifier output: {}", text))?;
    Ok(Classification {
        category: verdict.category,
        rationale: Some(verdict.rationale),
    })
}
