use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use super::{require_active_config, ApiError};
use crate::models::{ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse};
use crate::state::AppState;

fn upstream(e: anyhow::Error) -> ApiError {
    tracing::warn!("LLM request failed: {e:#}");
    (StatusCode::BAD_GATEWAY, format!("{e:#}"))
}

/// POST /api/llm/chat - One non-streaming completion with the active provider
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let config = require_active_config(&state)?;
    if req.messages.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "At least one message is required".to_string()));
    }
    let content = state
        .llm(&config)
        .chat(&req.messages)
        .await
        .map_err(upstream)?;
    Ok(Json(ChatResponse { content }))
}

/// POST /api/llm/embedding
pub async fn embedding(
    State(state): State<AppState>,
    Json(req): Json<EmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let config = require_active_config(&state)?;
    if req.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Text is required".to_string()));
    }
    let embedding = state
        .llm(&config)
        .embed(&req.text)
        .await
        .map_err(upstream)?;
    Ok(Json(EmbeddingResponse {
        dimension: embedding.len(),
        embedding,
    }))
}
