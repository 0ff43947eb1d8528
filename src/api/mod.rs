pub mod analysis;
pub mod configurations;
pub mod docs;
pub mod llm;
pub mod repositories;
pub mod vectorize;

use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::models::Configuration;
use crate::state::AppState;

pub type ApiError = (StatusCode, String);

pub(crate) fn bad_request(e: anyhow::Error) -> ApiError {
    (StatusCode::BAD_REQUEST, format!("{e:#}"))
}

pub(crate) fn conflict(e: anyhow::Error) -> ApiError {
    (StatusCode::CONFLICT, format!("{e:#}"))
}

pub(crate) fn internal(e: anyhow::Error) -> ApiError {
    tracing::error!("Request failed: {e:#}");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
}

pub(crate) fn not_found(what: impl std::fmt::Display) -> ApiError {
    (StatusCode::NOT_FOUND, format!("{what} not found"))
}

/// Most operations need an active configuration (409 otherwise).
pub(crate) fn require_active_config(state: &AppState) -> Result<Configuration, ApiError> {
    state
        .active_configuration()
        .map_err(internal)?
        .ok_or_else(|| {
            (
                StatusCode::CONFLICT,
                "No active configuration. Create and activate one first.".to_string(),
            )
        })
}

/// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Every route of the HTTP API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        // Configurations
        .route(
            "/api/configurations",
            get(configurations::list_configurations).post(configurations::create_configuration),
        )
        .route("/api/configurations/active", get(configurations::active_configuration))
        .route(
            "/api/configurations/{id}",
            get(configurations::get_configuration)
                .put(configurations::update_configuration)
                .delete(configurations::delete_configuration),
        )
        .route(
            "/api/configurations/{id}/activate",
            post(configurations::activate_configuration),
        )
        .route("/api/configurations/{id}/test", post(configurations::test_configuration))
        // Repositories
        .route(
            "/api/repositories",
            get(repositories::list_repositories).post(repositories::clone_repository),
        )
        .route("/api/repositories/{name}", delete(repositories::delete_repository))
        .route("/api/repositories/{name}/update", post(repositories::update_repository))
        .route("/api/repositories/{name}/tree", get(repositories::repository_tree))
        .route("/api/repositories/{name}/modules", get(repositories::repository_modules))
        .route("/api/repositories/{name}/screens", get(repositories::repository_screens))
        .route(
            "/api/repositories/{name}/technology",
            get(repositories::repository_technology),
        )
        // Vectorization
        .route("/api/vectorize", post(vectorize::vectorize_repository))
        .route("/api/vectorize/module", post(vectorize::vectorize_module))
        .route("/api/vectorize/batches", get(vectorize::list_batches))
        .route("/api/vectorize/batches/{id}", get(vectorize::get_batch))
        .route("/api/vectorize/batches/{id}/cancel", post(vectorize::cancel_batch))
        .route("/api/vectorize/search", post(vectorize::search))
        .route("/api/vectorize/stats", get(vectorize::stats))
        .route("/api/vectorize/collection", delete(vectorize::clear_collection))
        // Documentation knowledge base
        .route("/api/vectorize/docs", post(docs::ingest_document))
        .route("/api/docs", get(docs::list_documents))
        .route("/api/docs/query", post(docs::query_documents))
        // Analysis and code generation
        .route(
            "/api/analysis",
            get(analysis::list_analyses).post(analysis::analyze),
        )
        .route(
            "/api/analysis/{id}",
            get(analysis::get_analysis).delete(analysis::delete_analysis),
        )
        .route("/api/analysis/{id}/generate", post(analysis::generate))
        // LLM passthrough
        .route("/api/llm/chat", post(llm::chat))
        .route("/api/llm/embedding", post(llm::embedding))
        .with_state(state)
}
