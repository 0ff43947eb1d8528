//! LLM facade: chat completions and embeddings for OpenAI, Mistral
//! (OpenAI-compatible API) and Ollama.

pub mod chat;
pub mod embeddings;
pub mod json;

use anyhow::{Context, Result};

use crate::models::{ChatMessage, ConnectionCheck, LlmProvider, LlmSettings};

pub use json::{extract_json_object, parse_json_reply};

/// Provider settings bound to a shared HTTP client.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(client: reqwest::Client, settings: LlmSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        chat::chat(&self.client, &self.settings, messages).await
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        embeddings::embed(&self.client, &self.settings, text).await
    }

    /// Check the provider: `/v1/models` for OpenAI-compatible APIs,
    /// `/api/tags` for Ollama.
    pub async fn test_connection(&self) -> ConnectionCheck {
        match self.reach().await {
            Ok(()) => ConnectionCheck::ok(format!("{} reachable", self.settings.provider)),
            Err(e) => ConnectionCheck::failed(format!("{e:#}")),
        }
    }

    async fn reach(&self) -> Result<()> {
        let base = self.settings.effective_base_url();
        let request = match self.settings.provider {
            LlmProvider::Ollama => self.client.get(format!("{base}/api/tags")),
            LlmProvider::OpenAi | LlmProvider::Mistral => {
                if self.settings.api_key.as_deref().map_or(true, str::is_empty) {
                    anyhow::bail!("{} requires an API key", self.settings.provider);
                }
                self.client
                    .get(format!("{base}/v1/models"))
                    .header("Authorization", bearer(&self.settings))
            }
        };
        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.settings.provider))?;
        check_response(resp, self.settings.provider.as_str()).await?;
        Ok(())
    }
}

pub(crate) fn bearer(settings: &LlmSettings) -> String {
    format!("Bearer {}", settings.api_key.as_deref().unwrap_or_default())
}

/// Turn a non-2xx response into an error carrying status and body.
pub(crate) async fn check_response(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("{what} returned {status}: {body}")
}
