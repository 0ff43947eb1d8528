use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{bearer, check_response};
use crate::models::{ChatMessage, LlmProvider, LlmSettings};

/// Send a non-streaming chat completion and return the assistant text.
pub async fn chat(
    client: &reqwest::Client,
    settings: &LlmSettings,
    messages: &[ChatMessage],
) -> Result<String> {
    if messages.is_empty() {
        anyhow::bail!("At least one message is required");
    }
    match settings.provider {
        LlmProvider::Ollama => call_ollama(client, settings, messages).await,
        LlmProvider::OpenAi | LlmProvider::Mistral => call_openai(client, settings, messages).await,
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

async fn call_ollama(
    client: &reqwest::Client,
    settings: &LlmSettings,
    messages: &[ChatMessage],
) -> Result<String> {
    let url = format!("{}/api/chat", settings.effective_base_url());
    let req = OllamaChatRequest {
        model: &settings.chat_model,
        messages,
        stream: false,
        options: OllamaOptions {
            temperature: settings.temperature,
            num_predict: settings.max_tokens,
        },
    };

    let resp = client
        .post(&url)
        .json(&req)
        .send()
        .await
        .context("Failed to call Ollama chat API")?;
    let body: OllamaChatResponse = check_response(resp, "Ollama chat API")
        .await?
        .json()
        .await
        .context("Failed to parse Ollama chat response")?;
    Ok(body.message.content)
}

// ─── OpenAI-compatible (OpenAI, Mistral) ─────────────────

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

async fn call_openai(
    client: &reqwest::Client,
    settings: &LlmSettings,
    messages: &[ChatMessage],
) -> Result<String> {
    let url = format!("{}/v1/chat/completions", settings.effective_base_url());
    let req = OpenAiChatRequest {
        model: &settings.chat_model,
        messages,
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    };

    let resp = client
        .post(&url)
        .header("Authorization", bearer(settings))
        .json(&req)
        .send()
        .await
        .with_context(|| format!("Failed to call {} chat API", settings.provider))?;
    let what = format!("{} chat API", settings.provider);
    let body: OpenAiChatResponse = check_response(resp, &what)
        .await?
        .json()
        .await
        .with_context(|| format!("Failed to parse {} chat response", settings.provider))?;

    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .context("Chat response contained no choices")
}
