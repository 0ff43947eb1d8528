//! NSDK documentation knowledge base: chunked reference text embedded into a
//! sibling `<collection>_docs` collection and queried while generating code.

mod chunk;

pub use chunk::{chunk_document, ChunkKind, DocChunk};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Configuration, VectorStoreSettings};
use crate::scan::{char_prefix, Patterns};
use crate::state::AppState;
use crate::vector::{SearchHit, VectorPayload, VectorRecord};

/// `repo` value of every documentation vector.
pub const DOCS_REPO: &str = "nsdk-docs";
pub const DEFAULT_QUERY_LIMIT: usize = 3;
pub const DEFAULT_QUERY_THRESHOLD: f32 = 0.7;
const SNIPPET_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            _ => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub name: String,
    pub status: DocumentStatus,
    pub total_chunks: usize,
    pub char_count: usize,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returned by [`ingest`] while another ingestion of the same name runs.
#[derive(Debug)]
pub struct DocumentBusy(pub String);

impl std::fmt::Display for DocumentBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Document {} is already being processed", self.0)
    }
}

impl std::error::Error for DocumentBusy {}

#[derive(Debug, Clone)]
pub struct Ingestion {
    pub document: DocumentRecord,
    /// A completed document of the same name already existed
    pub reused: bool,
}

/// Settings of the documentation collection next to the code collection.
pub fn docs_settings(settings: &VectorStoreSettings) -> VectorStoreSettings {
    VectorStoreSettings {
        collection_name: format!("{}_docs", settings.collection_name),
        ..settings.clone()
    }
}

fn to_record(document: &str, index: usize, chunk: DocChunk, embedding: Vec<f32>) -> VectorRecord {
    let path = format!("{document}#{index}");
    let mut patterns = Patterns::new();
    patterns.insert("section".to_string(), vec![chunk.section]);
    VectorRecord {
        id: VectorRecord::record_id(DOCS_REPO, &path),
        embedding,
        payload: VectorPayload {
            repo: DOCS_REPO.to_string(),
            path,
            file_name: document.to_string(),
            kind: chunk.kind.as_str().to_string(),
            technology: "nsdk".to_string(),
            module: chunk.title,
            content_preview: chunk.content,
            patterns,
        },
    }
}

enum Claim {
    New(DocumentRecord),
    Existing(DocumentRecord),
}

/// Reserve `name` for ingestion. A completed document is returned as is and
/// a failed one is replaced.
fn claim(state: &AppState, name: &str, char_count: usize) -> Result<Claim> {
    let db = state.db.lock();
    match db.get_document_by_name(name)? {
        Some(doc) if doc.status == DocumentStatus::Completed => return Ok(Claim::Existing(doc)),
        Some(doc) if doc.status == DocumentStatus::Processing => {
            return Err(DocumentBusy(name.to_string()).into())
        }
        Some(doc) => {
            db.delete_document(doc.id)?;
        }
        None => {}
    }
    let now = Utc::now();
    let doc = DocumentRecord {
        id: Uuid::new_v4(),
        name: name.to_string(),
        status: DocumentStatus::Processing,
        total_chunks: 0,
        char_count,
        error: None,
        created_at: now,
        updated_at: now,
    };
    db.insert_document(&doc)?;
    Ok(Claim::New(doc))
}

async fn embed_and_store(state: &AppState, config: &Configuration, name: &str, text: &str) -> Result<usize> {
    let chunks = chunk_document(text);
    if chunks.is_empty() {
        anyhow::bail!("Document {name} has no indexable text");
    }
    let llm = state.llm(config);
    let dimension = config.vector_store.dimension;

    let records: Vec<VectorRecord> = stream::iter(chunks.into_iter().enumerate())
        .map(|(i, chunk)| {
            let llm = &llm;
            async move {
                let embedding = llm
                    .embed(&format!("{}\n\n{}", chunk.title, chunk.content))
                    .await
                    .with_context(|| format!("Failed to embed chunk {} ({})", i, chunk.title))?;
                if embedding.len() != dimension {
                    anyhow::bail!("Embedding has dimension {}, expected {}", embedding.len(), dimension);
                }
                Ok::<_, anyhow::Error>(to_record(name, i, chunk, embedding))
            }
        })
        .buffered(state.config.embed_concurrency.max(1))
        .try_collect()
        .await?;

    let store = state.vector_store(&docs_settings(&config.vector_store))?;
    store.initialize().await?;
    store.upsert(records, dimension).await
}

/// Chunk, embed and store one document's text.
pub async fn ingest(state: &AppState, config: &Configuration, name: &str, text: &str) -> Result<Ingestion> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Document name must not be empty");
    }
    if text.trim().is_empty() {
        anyhow::bail!("Document {name} is empty");
    }

    let mut doc = match claim(state, name, text.chars().count())? {
        Claim::New(doc) => doc,
        Claim::Existing(existing) => {
            tracing::info!("Document {} already ingested ({} chunks)", name, existing.total_chunks);
            return Ok(Ingestion {
                document: existing,
                reused: true,
            });
        }
    };
    tracing::info!("Ingesting document {}", name);

    let outcome = embed_and_store(state, config, name, text).await;
    doc.updated_at = Utc::now();
    match &outcome {
        Ok(stored) => {
            doc.status = DocumentStatus::Completed;
            doc.total_chunks = *stored;
            tracing::info!("Document {}: stored {} chunks", name, stored);
        }
        Err(e) => {
            doc.status = DocumentStatus::Failed;
            doc.error = Some(format!("{e:#}"));
            tracing::warn!("Document {} failed: {e:#}", name);
        }
    }
    state.db.lock().update_document(&doc)?;
    outcome?;
    Ok(Ingestion {
        document: doc,
        reused: false,
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocSnippet {
    pub document: String,
    pub title: String,
    pub score: f32,
    pub text: String,
}

impl From<SearchHit> for DocSnippet {
    fn from(hit: SearchHit) -> Self {
        Self {
            document: hit.payload.file_name,
            title: hit.payload.module,
            score: hit.score,
            text: char_prefix(&hit.payload.content_preview, SNIPPET_MAX_CHARS).to_string(),
        }
    }
}

/// Best documentation snippets for `query`, most similar first.
pub async fn query_documentation(
    state: &AppState,
    config: &Configuration,
    query: &str,
    limit: usize,
    threshold: f32,
) -> Result<Vec<DocSnippet>> {
    let query = query.trim();
    if query.is_empty() {
        anyhow::bail!("Query must not be empty");
    }
    let embedding = state
        .llm(config)
        .embed(query)
        .await
        .context("Failed to embed documentation query")?;
    let store = state.vector_store(&docs_settings(&config.vector_store))?;
    store.initialize().await?;
    let hits = store.search(&embedding, limit.max(1), threshold).await?;
    Ok(hits
        .into_iter()
        .filter(|hit| hit.payload.repo == DOCS_REPO)
        .map(DocSnippet::from)
        .collect())
}

/// Prompt text for a set of snippets; empty when there are none.
pub fn format_snippets(snippets: &[DocSnippet]) -> String {
    snippets
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let ellipsis = if s.text.chars().count() >= SNIPPET_MAX_CHARS { "..." } else { "" };
            format!("Source {} ({}):\n{}{}", i + 1, s.title, s.text, ellipsis)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
