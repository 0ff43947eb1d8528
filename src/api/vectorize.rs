use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::{bad_request, conflict, internal, not_found, require_active_config, ApiError};
use crate::models::{SearchRequest, SearchResponse, VectorizeRequest};
use crate::state::AppState;
use crate::vectorize::{self, BatchKind, BatchView, VectorizationStats};

async fn start(state: AppState, req: VectorizeRequest, kind: BatchKind) -> Result<(StatusCode, Json<BatchView>), ApiError> {
    let config = require_active_config(&state)?;
    let batch = vectorize::start(&state, &config, req, kind).map_err(bad_request)?;
    Ok((StatusCode::ACCEPTED, Json(batch.view())))
}

/// POST /api/vectorize - Vectorize a whole repository in the background
pub async fn vectorize_repository(
    State(state): State<AppState>,
    Json(req): Json<VectorizeRequest>,
) -> Result<(StatusCode, Json<BatchView>), ApiError> {
    start(state, req, BatchKind::Repository).await
}

/// POST /api/vectorize/module - Vectorize one directory of a repository
pub async fn vectorize_module(
    State(state): State<AppState>,
    Json(req): Json<VectorizeRequest>,
) -> Result<(StatusCode, Json<BatchView>), ApiError> {
    start(state, req, BatchKind::Module).await
}

/// GET /api/vectorize/batches - Newest first
pub async fn list_batches(State(state): State<AppState>) -> Json<Vec<BatchView>> {
    Json(state.batches.list().iter().map(|b| b.view()).collect())
}

/// GET /api/vectorize/batches/{id}
pub async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchView>, ApiError> {
    state
        .batches
        .get(id)
        .map(|b| Json(b.view()))
        .ok_or_else(|| not_found(format!("Batch {id}")))
}

/// POST /api/vectorize/batches/{id}/cancel - 409 once the batch has finished
pub async fn cancel_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchView>, ApiError> {
    if state.batches.get(id).is_none() {
        return Err(not_found(format!("Batch {id}")));
    }
    let batch = state.batches.cancel(id).map_err(conflict)?;
    tracing::info!("Cancelled batch {}", id);
    Ok(Json(batch.view()))
}

/// POST /api/vectorize/search - Similarity search over the active collection
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let config = require_active_config(&state)?;
    if req.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }
    vectorize::search_similar(&state, &config, req)
        .await
        .map(Json)
        .map_err(internal)
}

/// GET /api/vectorize/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<VectorizationStats>, ApiError> {
    let config = state.active_configuration().map_err(internal)?;
    Ok(Json(vectorize::stats(&state, config.as_ref()).await))
}

/// DELETE /api/vectorize/collection - Drop every vector of the active collection
pub async fn clear_collection(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let config = require_active_config(&state)?;
    vectorize::clear_collection(&state, &config)
        .await
        .map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}
