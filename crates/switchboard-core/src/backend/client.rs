//! Responses API client

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::BackendConfig;
use crate::constants;

/// Non-streaming client for a Responses-compatible endpoint
pub struct ResponsesClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ResponsesClient {
    fn create_http_client() -> Client {
        Client::builder()
            .user_agent("Switchboard/0.1")
            .connect_timeout(constants::timeouts::HTTP_CONNECT)
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build HTTP client: {}. Using default client.", e);
                Client::new()
            })
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Self::create_http_client(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Client for the configured backend, if an API key is available
    pub fn from_config(config: &BackendConfig) -> Option<Self> {
        let api_key = config.api_key()?;
        Some(Self::new(&config.base_url, api_key))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
    }

    /// POST a request body and return the decoded response
    pub async fn create(&self, body: &Value) -> Result<Value> {
        let url = self.endpoint();
        debug!(url = %url, model = ?body.get("model"), "Responses request");

        let response = self
            .build_request(&url)
            .json(body)
            .send()
            .await
            .context("Responses request failed")?;
        let response = self.handle_error_response(response).await?;
        response
            .json()
            .await
            .context("Responses body was not JSON")
    }

    async fn handle_error_response(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        error!("API error response: {} - {}", status, error_text);
        Err(anyhow::anyhow!("API error: {} - {}", status, error_text))
    }
}

/// Concatenated `output_text` parts of every message in a response
pub(crate) fn output_text(body: &Value) -> String {
    output_items(body)
        .filter(|item| item_type(item) == Some("message"))
        .filter_map(|item| item.get("content").and_then(|c| c.as_array()))
        .flatten()
        .filter(|part| item_type(part) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string()
}

pub(crate) fn output_items(body: &Value) -> impl Iterator<Item = &Value> {
    body.get("output")
        .and_then(|o| o.as_array())
        .into_iter()
        .flatten()
}

pub(crate) fn item_type(item: &Value) -> Option<&str> {
    item.get("type").and_then(|t| t.as_str())
}
