use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::{bad_request, conflict, internal, not_found, require_active_config, ApiError};
use crate::analysis::{self, AnalysisRecord, ScreenSource};
use crate::codegen::{GenerationJob, GenerationResult};
use crate::models::{AnalyzeRequest, GenerateRequest};
use crate::state::AppState;

fn load(state: &AppState, id: Uuid) -> Result<AnalysisRecord, ApiError> {
    state
        .db
        .lock()
        .get_analysis(id)
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("Analysis {id}")))
}

/// POST /api/analysis - Ask the LLM for a migration plan of one screen.
/// An unparseable reply is stored as a failed analysis, not an HTTP error.
pub async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<AnalysisRecord>), ApiError> {
    let config = require_active_config(&state)?;
    let source = ScreenSource::resolve(&state.config.repos_dir(), req).map_err(bad_request)?;
    if source.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "File content is empty".to_string()));
    }
    let record = analysis::analyze(&state, &config, source)
        .await
        .map_err(|e| {
            tracing::warn!("Analysis failed: {e:#}");
            (StatusCode::BAD_GATEWAY, format!("{e:#}"))
        })?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/analysis - Newest first
pub async fn list_analyses(
    State(state): State<AppState>,
) -> Result<Json<Vec<AnalysisRecord>>, ApiError> {
    Ok(Json(state.db.lock().list_analyses().map_err(internal)?))
}

/// GET /api/analysis/{id}
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisRecord>, ApiError> {
    Ok(Json(load(&state, id)?))
}

/// DELETE /api/analysis/{id}
pub async fn delete_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.db.lock().delete_analysis(id).map_err(internal)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("Analysis {id}")))
    }
}

/// POST /api/analysis/{id}/generate - Generate code from the stored plan and
/// commit it on feature branches of the target repositories
pub async fn generate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerationResult>, ApiError> {
    let config = require_active_config(&state)?;
    let record = load(&state, id)?;
    let job = GenerationJob::prepare(&state.config.repos_dir(), &config, &record, req.target)
        .map_err(conflict)?;

    let push = req.push.unwrap_or(state.config.push_branches);
    let result = job
        .run(&state, &config, push)
        .await
        .map_err(internal)?;
    Ok(Json(result))
}
