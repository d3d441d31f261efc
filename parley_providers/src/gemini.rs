use std::time::Duration;

use async_trait::async_trait;
use parley_core::{ChatMessage, LLMProvider, LLMResponse, Role, Usage};
use reqwest::Client;
use serde_json::json;
use tracing::info;

use crate::retry::retry_with_backoff;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Backoff schedule for transient transport failures. The turn timeout
/// upstream bounds the whole sequence.
const RETRY_DELAYS: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(2)];

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    #[must_use]
    pub fn new(api_key: String) -> Self {
        info!("Creating GeminiProvider");
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Gemini's generateContent uses "model" where we say assistant.
    const fn wire_role(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "model",
        }
    }

    fn build_request(messages: &[ChatMessage]) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": Self::wire_role(m.role),
                    "parts": [{ "text": m.content }],
                })
            })
            .collect();
        json!({ "contents": contents })
    }

    /// Helper method to send a single request
    async fn try_send(&self, model: &str, request: &serde_json::Value) -> anyhow::Result<LLMResponse> {
        let response = self
            .client
            .post(format!(
                "{}/models/{model}:generateContent",
                self.base_url
            ))
            .header("x-goog-api-key", self.api_key.as_str())
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        Self::parse_response(&response)
    }

    fn parse_response(response: &serde_json::Value) -> anyhow::Result<LLMResponse> {
        let parts = response["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid response format: missing candidate parts"))?;

        let content: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        let usage = response["usageMetadata"].as_object().map(|u| Usage {
            prompt_tokens: u32::try_from(u["promptTokenCount"].as_u64().unwrap_or(0)).unwrap_or(0),
            completion_tokens: u32::try_from(u["candidatesTokenCount"].as_u64().unwrap_or(0))
                .unwrap_or(0),
            total_tokens: u32::try_from(u["totalTokenCount"].as_u64().unwrap_or(0)).unwrap_or(0),
        });

        Ok(LLMResponse { content, usage })
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn chat(&self, messages: &[ChatMessage], model: &str) -> anyhow::Result<LLMResponse> {
        let request = Self::build_request(messages);

        info!("Sending request to Gemini API: model={model}");

        let response =
            retry_with_backoff(|| self.try_send(model, &request), &RETRY_DELAYS).await?;

        info!("Received response from Gemini API");
        Ok(response)
    }

    fn default_model(&self) -> &'static str {
        "gemini-2.5-flash"
    }
}
