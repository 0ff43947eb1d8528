use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{bearer, check_response};
use crate::models::{LlmProvider, LlmSettings};

/// Maximum characters sent per text to the embedding API.
/// nomic-embed-text has an 8 192-token context; dense content can reach
/// ~2.3 tokens/char, so 3 000 chars stays under it.
pub const MAX_EMBED_CHARS: usize = 3_000;

/// Truncate `text` to at most `MAX_EMBED_CHARS` bytes, splitting on a UTF-8 char boundary.
pub fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Embed one text with the configured provider.
pub async fn embed(client: &reqwest::Client, settings: &LlmSettings, text: &str) -> Result<Vec<f32>> {
    let input = truncate_for_embedding(text);
    let embedding = match settings.provider {
        LlmProvider::Ollama => embed_ollama(client, settings, input).await?,
        LlmProvider::OpenAi | LlmProvider::Mistral => embed_openai(client, settings, input).await?,
    };
    if embedding.is_empty() {
        anyhow::bail!("{} returned an empty embedding", settings.provider);
    }
    Ok(embedding)
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    /// Ask Ollama to truncate inputs longer than the model context instead of failing.
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(client: &reqwest::Client, settings: &LlmSettings, text: &str) -> Result<Vec<f32>> {
    let url = format!("{}/api/embed", settings.effective_base_url());
    let req = OllamaEmbedRequest {
        model: &settings.embedding_model,
        input: vec![text],
        truncate: true,
    };

    let resp = client
        .post(&url)
        .json(&req)
        .send()
        .await
        .context("Failed to call Ollama embed API")?;
    let body: OllamaEmbedResponse = check_response(resp, "Ollama embed API")
        .await?
        .json()
        .await
        .context("Failed to parse Ollama embed response")?;

    body.embeddings
        .into_iter()
        .next()
        .context("No embedding returned")
}

// ─── OpenAI-compatible (OpenAI, Mistral) ─────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    embedding: Vec<f32>,
}

async fn embed_openai(client: &reqwest::Client, settings: &LlmSettings, text: &str) -> Result<Vec<f32>> {
    let url = format!("{}/v1/embeddings", settings.effective_base_url());
    let req = OpenAiEmbedRequest {
        model: &settings.embedding_model,
        input: vec![text],
    };

    let resp = client
        .post(&url)
        .header("Authorization", bearer(settings))
        .json(&req)
        .send()
        .await
        .with_context(|| format!("Failed to call {} embed API", settings.provider))?;
    let what = format!("{} embed API", settings.provider);
    let body: OpenAiEmbedResponse = check_response(resp, &what)
        .await?
        .json()
        .await
        .with_context(|| format!("Failed to parse {} embed response", settings.provider))?;

    body.data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .context("No embedding returned")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_for_embedding("SCREEN a"), "SCREEN a");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "é".repeat(MAX_EMBED_CHARS);
        let cut = truncate_for_embedding(&text);
        assert!(cut.len() <= MAX_EMBED_CHARS);
        assert!(cut.chars().all(|c| c == 'é'));
        assert_eq!(cut.len(), MAX_EMBED_CHARS);
    }

    #[test]
    fn test_truncate_odd_boundary() {
        let text = format!("a{}", "é".repeat(MAX_EMBED_CHARS));
        let cut = truncate_for_embedding(&text);
        assert_eq!(cut.len(), MAX_EMBED_CHARS - 1);
    }
}
