use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{bad_request, conflict, internal, not_found, ApiError};
use crate::git::{self, RepositoryInfo, SyncOutcome, TreeNode};
use crate::models::{repo_name_from_url, CloneRepositoryRequest, UpdateRepositoryRequest};
use crate::scan::nsdk::NsdkSummary;
use crate::scan::{detect_technology, DetectionReport};
use crate::state::AppState;

/// Validate `name` and make sure it has been cloned.
fn existing_repo(state: &AppState, name: &str) -> Result<std::path::PathBuf, ApiError> {
    git::validate_repo_name(name).map_err(bad_request)?;
    let dir = state.config.repos_dir().join(name);
    if !dir.join(".git").exists() {
        return Err(not_found(format!("Repository {name}")));
    }
    Ok(dir)
}

/// Run blocking repository inspection off the async runtime.
async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> anyhow::Result<T> + Send + 'static,
) -> Result<T, ApiError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| internal(anyhow::anyhow!("Repository task failed: {e}")))?
        .map_err(internal)
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    #[serde(flatten)]
    pub sync: SyncOutcome,
    pub repository: RepositoryInfo,
}

/// GET /api/repositories - Cloned repositories, sorted by name
pub async fn list_repositories(
    State(state): State<AppState>,
) -> Result<Json<Vec<RepositoryInfo>>, ApiError> {
    let repos_dir = state.config.repos_dir();
    Ok(Json(blocking(move || git::list(&repos_dir)).await?))
}

/// POST /api/repositories - Clone a repository (or fast-forward an existing clone)
pub async fn clone_repository(
    State(state): State<AppState>,
    Json(req): Json<CloneRepositoryRequest>,
) -> Result<(StatusCode, Json<SyncResponse>), ApiError> {
    let url = req.url.trim().to_string();
    git::validate_url(&url).map_err(bad_request)?;
    let name = req
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| repo_name_from_url(&url));
    git::validate_repo_name(&name).map_err(bad_request)?;

    // Credentials come from whichever active repository config matches the URL
    let creds = state
        .active_configuration()
        .map_err(internal)?
        .and_then(|c| c.credentials_for(&url));

    let sync = sync(&state, url, &name, req.branch, creds).await?;
    let repos_dir = state.config.repos_dir();
    let info_name = name.clone();
    let repository = blocking(move || git::info(&repos_dir, &info_name)).await?;
    Ok((StatusCode::CREATED, Json(SyncResponse { sync, repository })))
}

async fn sync(
    state: &AppState,
    url: String,
    name: &str,
    branch: String,
    creds: Option<git::GitCredentials>,
) -> Result<SyncOutcome, ApiError> {
    let target = state.config.repos_dir().join(name);
    git::sync_repository(
        &state.git,
        Duration::from_secs(state.config.clone_timeout_secs),
        url,
        target,
        branch,
        creds,
    )
    .await
    .map_err(|e| {
        tracing::warn!("Sync of {} failed: {e:#}", name);
        // divergence, auth and network failures are not server bugs
        conflict(e)
    })
}

/// DELETE /api/repositories/{name}
pub async fn delete_repository(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    git::validate_repo_name(&name).map_err(bad_request)?;
    let repos_dir = state.config.repos_dir();
    let repo_guard = state.git.lock_repo(&repos_dir.join(&name)).await;
    let target = name.clone();
    let deleted = blocking(move || git::delete(&repos_dir, &target)).await?;
    drop(repo_guard);
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("Repository {name}")))
    }
}

/// POST /api/repositories/{name}/update - Fetch and fast-forward a branch
pub async fn update_repository(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<UpdateRepositoryRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    existing_repo(&state, &name)?;
    let repos_dir = state.config.repos_dir();
    let info_name = name.clone();
    let before = blocking(move || git::info(&repos_dir, &info_name)).await?;
    let url = before.remote_url.clone().unwrap_or_default();
    let creds = state
        .active_configuration()
        .map_err(internal)?
        .and_then(|c| c.credentials_for(&url));

    let sync = sync(&state, url, &name, req.branch, creds).await?;
    let repos_dir = state.config.repos_dir();
    let repository = blocking(move || git::info(&repos_dir, &name)).await?;
    Ok(Json(SyncResponse { sync, repository }))
}

#[derive(Debug, Deserialize)]
pub struct TreeQuery {
    pub max_depth: Option<usize>,
}

/// GET /api/repositories/{name}/tree?max_depth=N
pub async fn repository_tree(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<TreeQuery>,
) -> Result<Json<TreeNode>, ApiError> {
    existing_repo(&state, &name)?;
    let repos_dir = state.config.repos_dir();
    let depth = query
        .max_depth
        .unwrap_or(git::manager::DEFAULT_TREE_DEPTH)
        .clamp(1, 20);
    Ok(Json(blocking(move || git::tree(&repos_dir, &name, depth)).await?))
}

/// GET /api/repositories/{name}/modules - NSDK `.NCL` modules
pub async fn repository_modules(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<NsdkSummary>>, ApiError> {
    existing_repo(&state, &name)?;
    let repos_dir = state.config.repos_dir();
    Ok(Json(blocking(move || git::nsdk_modules(&repos_dir, &name)).await?))
}

/// GET /api/repositories/{name}/screens - NSDK `.SCR` screens
pub async fn repository_screens(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<NsdkSummary>>, ApiError> {
    existing_repo(&state, &name)?;
    let repos_dir = state.config.repos_dir();
    Ok(Json(blocking(move || git::nsdk_screens(&repos_dir, &name)).await?))
}

/// GET /api/repositories/{name}/technology
pub async fn repository_technology(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DetectionReport>, ApiError> {
    let dir = existing_repo(&state, &name)?;
    Ok(Json(blocking(move || Ok(detect_technology(&dir))).await?))
}
