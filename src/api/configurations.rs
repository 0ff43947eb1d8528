use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use super::{bad_request, internal, not_found, ApiError};
use crate::models::{Configuration, ConfigurationRequest, ConfigurationView, ConnectionCheck};
use crate::state::AppState;

fn load(state: &AppState, id: Uuid) -> Result<Configuration, ApiError> {
    state
        .db
        .lock()
        .get_configuration(id)
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("Configuration {id}")))
}

/// GET /api/configurations - Newest first, secrets redacted
pub async fn list_configurations(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConfigurationView>>, ApiError> {
    let configs = state.db.lock().list_configurations().map_err(internal)?;
    Ok(Json(configs.iter().map(ConfigurationView::from).collect()))
}

/// POST /api/configurations - Store a new (inactive) configuration
pub async fn create_configuration(
    State(state): State<AppState>,
    Json(req): Json<ConfigurationRequest>,
) -> Result<(StatusCode, Json<ConfigurationView>), ApiError> {
    let config = Configuration::new(req);
    config.validate().map_err(bad_request)?;
    state
        .db
        .lock()
        .insert_configuration(&config)
        .map_err(internal)?;
    tracing::info!("Created configuration {} ({})", config.name, config.id);
    Ok((StatusCode::CREATED, Json(ConfigurationView::from(&config))))
}

/// GET /api/configurations/active
pub async fn active_configuration(
    State(state): State<AppState>,
) -> Result<Json<ConfigurationView>, ApiError> {
    let config = state
        .active_configuration()
        .map_err(internal)?
        .ok_or_else(|| not_found("Active configuration"))?;
    Ok(Json(ConfigurationView::from(&config)))
}

/// GET /api/configurations/{id}
pub async fn get_configuration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConfigurationView>, ApiError> {
    Ok(Json(ConfigurationView::from(&load(&state, id)?)))
}

/// PUT /api/configurations/{id} - Replace the editable fields. Omitted
/// tokens and API keys keep their stored values.
pub async fn update_configuration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfigurationRequest>,
) -> Result<Json<ConfigurationView>, ApiError> {
    let mut config = load(&state, id)?;
    config.apply(req);
    config.validate().map_err(bad_request)?;
    let updated = state
        .db
        .lock()
        .update_configuration(&config)
        .map_err(internal)?;
    if !updated {
        return Err(not_found(format!("Configuration {id}")));
    }
    Ok(Json(ConfigurationView::from(&config)))
}

/// DELETE /api/configurations/{id}
pub async fn delete_configuration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .db
        .lock()
        .delete_configuration(id)
        .map_err(internal)?;
    if !deleted {
        return Err(not_found(format!("Configuration {id}")));
    }
    tracing::info!("Deleted configuration {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/configurations/{id}/activate - Deactivates every other configuration
pub async fn activate_configuration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConfigurationView>, ApiError> {
    let activated = state
        .db
        .lock()
        .activate_configuration(id)
        .map_err(internal)?;
    if !activated {
        return Err(not_found(format!("Configuration {id}")));
    }
    let config = load(&state, id)?;
    tracing::info!("Activated configuration {} ({})", config.name, id);
    Ok(Json(ConfigurationView::from(&config)))
}

#[derive(Debug, Serialize)]
pub struct ConnectionReport {
    pub llm: ConnectionCheck,
    pub vector_store: ConnectionCheck,
}

/// POST /api/configurations/{id}/test - Check the LLM provider and vector store
pub async fn test_configuration(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectionReport>, ApiError> {
    let config = load(&state, id)?;
    let llm = state.llm(&config).test_connection().await;
    let vector_store = match state.vector_store(&config.vector_store) {
        Ok(store) => store.test_connection().await,
        Err(e) => ConnectionCheck::failed(format!("{e:#}")),
    };
    Ok(Json(ConnectionReport { llm, vector_store }))
}
