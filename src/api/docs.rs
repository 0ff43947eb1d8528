use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use super::{internal, require_active_config, ApiError};
use crate::docs::{self, DocumentBusy, DocumentRecord};
use crate::models::{DocQueryRequest, DocQueryResponse, DocumentRequest};
use crate::state::AppState;

/// Upper bound for one documentation query
const MAX_DOC_QUERY_LIMIT: usize = 20;

/// POST /api/vectorize/docs - Chunk and embed documentation text. 201 for a
/// new document, 200 when one with the same name was already completed.
pub async fn ingest_document(
    State(state): State<AppState>,
    Json(req): Json<DocumentRequest>,
) -> Result<(StatusCode, Json<DocumentRecord>), ApiError> {
    let config = require_active_config(&state)?;
    if req.name.trim().is_empty() || req.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Document name and content are required".to_string()));
    }
    match docs::ingest(&state, &config, &req.name, &req.content).await {
        Ok(ingestion) if ingestion.reused => Ok((StatusCode::OK, Json(ingestion.document))),
        Ok(ingestion) => Ok((StatusCode::CREATED, Json(ingestion.document))),
        Err(e) if e.is::<DocumentBusy>() => Err((StatusCode::CONFLICT, e.to_string())),
        Err(e) => {
            tracing::warn!("Document ingestion failed: {e:#}");
            Err((StatusCode::BAD_GATEWAY, format!("{e:#}")))
        }
    }
}

/// GET /api/docs - Newest first
pub async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<DocumentRecord>>, ApiError> {
    Ok(Json(state.db.lock().list_documents().map_err(internal)?))
}

/// POST /api/docs/query - Documentation snippets for a query
pub async fn query_documents(
    State(state): State<AppState>,
    Json(req): Json<DocQueryRequest>,
) -> Result<Json<DocQueryResponse>, ApiError> {
    let config = require_active_config(&state)?;
    let query = req.query.trim();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }
    let snippets = docs::query_documentation(
        &state,
        &config,
        query,
        req.limit.clamp(1, MAX_DOC_QUERY_LIMIT),
        req.threshold.unwrap_or(docs::DEFAULT_QUERY_THRESHOLD),
    )
    .await
    .map_err(internal)?;
    Ok(Json(DocQueryResponse {
        query: query.to_string(),
        context: docs::format_snippets(&snippets),
        snippets,
    }))
}
