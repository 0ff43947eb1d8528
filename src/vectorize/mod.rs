//! Vectorization runs: clone, scan, embed and store a repository (or one of
//! its modules) in the background, tracked as a batch.

pub mod batch;
mod pipeline;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::git::{validate_repo_name, validate_url, GitCredentials};
use crate::models::{
    repo_name_from_url, Configuration, SearchRequest, SearchResponse, Technology, VectorizeRequest,
};
use crate::state::AppState;
use crate::vector::VectorStoreStats;

pub use batch::{BatchKind, BatchRegistry, BatchStats, BatchStatus, BatchView, VectorizationBatch};

/// Largest `limit` accepted by a similarity search.
const MAX_SEARCH_LIMIT: usize = 100;

/// Everything the background task needs, resolved before the batch starts.
#[derive(Debug, Clone)]
pub(crate) struct VectorizeJob {
    pub batch_id: uuid::Uuid,
    pub repo_url: String,
    pub repo_name: String,
    pub branch: String,
    pub technology: Option<Technology>,
    pub module_path: Option<String>,
    pub creds: Option<GitCredentials>,
}

/// Validate the request, register a batch and spawn the run. Returns the
/// batch as created (pending).
pub fn start(
    state: &AppState,
    config: &Configuration,
    req: VectorizeRequest,
    kind: BatchKind,
) -> Result<VectorizationBatch> {
    let repo_url = req
        .repo_url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| config.source_repo.url.clone())
        .trim()
        .to_string();
    validate_url(&repo_url)?;
    let branch = req
        .branch
        .filter(|b| !b.trim().is_empty())
        .unwrap_or_else(|| config.source_repo.branch.clone());
    let repo_name = repo_name_from_url(&repo_url);
    validate_repo_name(&repo_name)?;

    let module_path = req
        .module_path
        .map(|m| m.trim().trim_matches('/').to_string())
        .filter(|m| !m.is_empty());
    if kind == BatchKind::Module && module_path.is_none() {
        anyhow::bail!("module_path is required to vectorize a module");
    }
    if let Some(module) = &module_path {
        crate::git::safe_join(std::path::Path::new(""), module)?;
    }

    let name = match &module_path {
        Some(module) => format!("{repo_name}:{module}@{branch}"),
        None => format!("{repo_name}@{branch}"),
    };
    let batch = state.batches.create(
        name,
        kind,
        repo_url.clone(),
        branch.clone(),
        module_path.clone(),
    );
    tracing::info!("Created vectorization batch {} for {}", batch.id, batch.name);

    let job = VectorizeJob {
        batch_id: batch.id,
        creds: config.credentials_for(&repo_url),
        repo_url,
        repo_name,
        branch,
        technology: req.technology.filter(|t| *t != Technology::Unknown),
        module_path,
    };

    let task_state = state.clone();
    let task_config = config.clone();
    tokio::spawn(async move {
        let batch_id = job.batch_id;
        if let Err(e) = pipeline::run(&task_state, &task_config, job).await {
            tracing::error!("Vectorization batch {batch_id} failed: {e:#}");
            if !task_state.batches.is_cancelled(batch_id) {
                if let Err(e) = task_state.batches.fail(batch_id, format!("{e:#}")) {
                    tracing::warn!("Could not mark batch {batch_id} as failed: {e:#}");
                }
            }
        }
    });

    Ok(batch)
}

/// Embed `req.query` and search the configured vector store.
pub async fn search_similar(state: &AppState, config: &Configuration, req: SearchRequest) -> Result<SearchResponse> {
    let query = req.query.trim();
    if query.is_empty() {
        anyhow::bail!("Query must not be empty");
    }
    let limit = req.limit.clamp(1, MAX_SEARCH_LIMIT);
    let threshold = req
        .threshold
        .unwrap_or(config.vector_store.similarity_threshold);

    let embedding = state
        .llm(config)
        .embed(query)
        .await
        .context("Failed to embed query")?;
    let store = state.vector_store(&config.vector_store)?;
    let results = store.search(&embedding, limit, threshold).await?;
    tracing::info!("Search {:?}: {} hits", query, results.len());

    Ok(SearchResponse {
        query: query.to_string(),
        results,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorizationStats {
    pub batches: BatchStats,
    pub vector_store: Option<VectorStoreStats>,
    pub vector_store_error: Option<String>,
}

/// Batch aggregates plus the vector store's own figures when reachable.
pub async fn stats(state: &AppState, config: Option<&Configuration>) -> VectorizationStats {
    let batches = state.batches.stats();
    let Some(config) = config else {
        return VectorizationStats {
            batches,
            vector_store: None,
            vector_store_error: Some("No active configuration".to_string()),
        };
    };

    let store_stats = match state.vector_store(&config.vector_store) {
        Ok(store) => store.stats().await,
        Err(e) => Err(e),
    };
    match store_stats {
        Ok(s) => VectorizationStats {
            batches,
            vector_store: Some(s),
            vector_store_error: None,
        },
        Err(e) => {
            tracing::warn!("Vector store stats unavailable: {e:#}");
            VectorizationStats {
                batches,
                vector_store: None,
                vector_store_error: Some(format!("{e:#}")),
            }
        }
    }
}

/// Remove every vector from the configured collection.
pub async fn clear_collection(state: &AppState, config: &Configuration) -> Result<()> {
    let store = state.vector_store(&config.vector_store)?;
    store.clear().await?;
    tracing::info!("Cleared collection {}", config.vector_store.collection_name);
    Ok(())
}
