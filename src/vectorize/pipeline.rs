use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};
use std::time::Duration;

use super::VectorizeJob;
use crate::git::sync_repository;
use crate::models::{Configuration, Technology};
use crate::scan::{char_prefix, detect_technology, discover, embedding_text, ScannedFile};
use crate::state::AppState;
use crate::vector::{VectorPayload, VectorRecord};

/// Characters of content kept in each vector payload.
const PREVIEW_CHARS: usize = 1000;

pub(crate) async fn run(state: &AppState, config: &Configuration, job: VectorizeJob) -> Result<()> {
    let batches = &state.batches;
    let id = job.batch_id;
    if batches.is_cancelled(id) {
        return Ok(());
    }
    batches.start(id)?;

    let target = state.config.repos_dir().join(&job.repo_name);
    let sync = sync_repository(
        &state.git,
        Duration::from_secs(state.config.clone_timeout_secs),
        job.repo_url.clone(),
        target.clone(),
        job.branch.clone(),
        job.creds.clone(),
    )
    .await?;
    tracing::info!(
        "Batch {}: {:?} {} at {}",
        id,
        sync.action,
        job.repo_name,
        sync.commit_sha
    );
    if batches.is_cancelled(id) {
        return Ok(());
    }

    let technology = match job.technology {
        Some(t) => t,
        None => {
            let root = target.clone();
            let report = tokio::task::spawn_blocking(move || detect_technology(&root))
                .await
                .context("Detection task panicked")?;
            tracing::info!(
                "Batch {}: detected {} (nsdk={}, angular={}, spring={})",
                id,
                report.technology,
                report.nsdk_files,
                report.angular_files,
                report.spring_files
            );
            report.technology
        }
    };
    if technology == Technology::Unknown {
        anyhow::bail!("Could not detect a supported technology in {}", job.repo_name);
    }
    batches.set_technology(id, technology)?;

    let root = target.clone();
    let module_path = job.module_path.clone();
    let max_size = state.config.max_file_size_bytes();
    let files = tokio::task::spawn_blocking(move || {
        discover(&root, technology, module_path.as_deref(), max_size)
    })
    .await
    .context("Discovery task panicked")??;
    batches.add_files(id, files.iter().map(|f| f.relative_path.as_str()))?;
    tracing::info!("Batch {}: {} {} files to vectorize", id, files.len(), technology);

    let store = state.vector_store(&config.vector_store)?;
    store.initialize().await?;
    let llm = state.llm(config);
    let dimension = config.vector_store.dimension;

    let mut records = Vec::new();
    let mut outcomes = stream::iter(files)
        .map(|file| {
            let llm = &llm;
            async move {
                if batches.is_cancelled(id) {
                    return None;
                }
                let embedding = llm.embed(&embedding_text(&file)).await;
                Some((file, embedding))
            }
        })
        .buffer_unordered(state.config.embed_concurrency.max(1));

    while let Some(outcome) = outcomes.next().await {
        let Some((file, embedding)) = outcome else {
            continue;
        };
        let result = embedding.and_then(|e| {
            if e.len() != dimension {
                anyhow::bail!("Embedding has dimension {}, expected {}", e.len(), dimension);
            }
            Ok(e)
        });
        match result {
            Ok(embedding) => {
                mark(state, id, &file.relative_path, None);
                records.push(to_record(&job.repo_name, technology, file, embedding));
            }
            Err(e) => {
                tracing::warn!("Batch {}: {} failed: {e:#}", id, file.relative_path);
                mark(state, id, &file.relative_path, Some(format!("{e:#}")));
            }
        }
    }
    drop(outcomes);

    if batches.is_cancelled(id) {
        tracing::info!("Batch {} cancelled, {} vectors discarded", id, records.len());
        return Ok(());
    }

    let stored = store.upsert(records, dimension).await?;
    tracing::info!("Batch {}: stored {} vectors", id, stored);

    let batch = batches
        .get(id)
        .with_context(|| format!("Batch {id} disappeared"))?;
    if batch.failed_files > 0 {
        batches.fail(
            id,
            format!("{} of {} files failed", batch.failed_files, batch.total_files),
        )?;
    } else {
        batches.complete(id)?;
    }
    tracing::info!("Batch {} finished", id);
    Ok(())
}

fn mark(state: &AppState, id: uuid::Uuid, file_id: &str, error: Option<String>) {
    if let Err(e) = state.batches.mark_file_processed(id, file_id, error) {
        tracing::debug!("Batch {}: {e:#}", id);
    }
}

fn to_record(repo: &str, technology: Technology, file: ScannedFile, embedding: Vec<f32>) -> VectorRecord {
    VectorRecord {
        id: VectorRecord::record_id(repo, &file.relative_path),
        embedding,
        payload: VectorPayload {
            repo: repo.to_string(),
            content_preview: char_prefix(&file.content, PREVIEW_CHARS).to_string(),
            path: file.relative_path,
            file_name: file.file_name,
            kind: file.kind,
            technology: technology.to_string(),
            module: file.module,
            patterns: file.metadata.patterns,
        },
    }
}
