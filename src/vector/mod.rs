//! Vector store facade. The backend is picked from
//! [`VectorStoreSettings::kind`](crate::models::VectorStoreSettings).

pub mod chroma;
pub mod flat;
pub mod qdrant;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub(crate) use crate::llm::check_response;
use crate::models::{ConnectionCheck, VectorStoreKind, VectorStoreSettings};
use crate::scan::Patterns;

pub use chroma::ChromaStore;
pub use flat::FlatIndex;
pub use qdrant::QdrantStore;

/// Metadata stored next to each embedding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorPayload {
    pub repo: String,
    pub path: String,
    pub file_name: String,
    pub kind: String,
    pub technology: String,
    pub module: String,
    pub content_preview: String,
    pub patterns: Patterns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub payload: VectorPayload,
}

impl VectorRecord {
    /// Records are keyed by `repo/path` so re-vectorizing a file replaces it.
    pub fn record_id(repo: &str, path: &str) -> String {
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, format!("{repo}/{path}").as_bytes())
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorStoreStats {
    pub kind: VectorStoreKind,
    pub collection: String,
    pub vector_count: u64,
    pub dimension: Option<usize>,
}

pub enum VectorStore {
    Flat(Arc<FlatIndex>),
    Qdrant(QdrantStore),
    Chroma(ChromaStore),
}

impl VectorStore {
    /// Build a remote backend. The flat index is shared process-wide and is
    /// handed in by the caller.
    pub fn remote(settings: &VectorStoreSettings, client: reqwest::Client) -> Result<Self> {
        validate_collection_name(&settings.collection_name)?;
        let base_url = settings
            .effective_connection_string()
            .context("Vector store connection string is required")?;
        match settings.kind {
            VectorStoreKind::Qdrant => Ok(Self::Qdrant(QdrantStore::new(
                client,
                base_url,
                settings.collection_name.clone(),
                settings.dimension,
            ))),
            VectorStoreKind::Chroma => Ok(Self::Chroma(ChromaStore::new(
                client,
                base_url,
                settings.collection_name.clone(),
            ))),
            VectorStoreKind::Faiss => anyhow::bail!("The flat index is not a remote store"),
        }
    }

    pub fn kind(&self) -> VectorStoreKind {
        match self {
            Self::Flat(_) => VectorStoreKind::Faiss,
            Self::Qdrant(_) => VectorStoreKind::Qdrant,
            Self::Chroma(_) => VectorStoreKind::Chroma,
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        match self {
            Self::Flat(_) => Ok(()),
            Self::Qdrant(s) => s.initialize().await,
            Self::Chroma(s) => s.initialize().await.map(|_| ()),
        }
    }

    /// Insert or replace records. Every embedding must have `dimension` entries.
    pub async fn upsert(&self, records: Vec<VectorRecord>, dimension: usize) -> Result<usize> {
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != dimension) {
            anyhow::bail!(
                "Embedding for {} has dimension {}, expected {}",
                bad.payload.path,
                bad.embedding.len(),
                dimension
            );
        }
        if records.is_empty() {
            return Ok(0);
        }
        let count = records.len();
        match self {
            Self::Flat(s) => s.upsert(records)?,
            Self::Qdrant(s) => s.upsert(records).await?,
            Self::Chroma(s) => s.upsert(records).await?,
        }
        Ok(count)
    }

    /// At most `limit` hits with score >= `threshold`, best first.
    pub async fn search(&self, query: &[f32], limit: usize, threshold: f32) -> Result<Vec<SearchHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut hits = match self {
            Self::Flat(s) => s.search(query, limit, threshold),
            Self::Qdrant(s) => s.search(query, limit, threshold).await?,
            Self::Chroma(s) => s.search(query, limit).await?,
        };
        finalize_hits(&mut hits, limit, threshold);
        Ok(hits)
    }

    pub async fn stats(&self) -> Result<VectorStoreStats> {
        match self {
            Self::Flat(s) => Ok(s.stats()),
            Self::Qdrant(s) => s.stats().await,
            Self::Chroma(s) => s.stats().await,
        }
    }

    pub async fn clear(&self) -> Result<()> {
        match self {
            Self::Flat(s) => s.clear(),
            Self::Qdrant(s) => s.clear().await,
            Self::Chroma(s) => s.clear().await,
        }
    }

    pub async fn test_connection(&self) -> ConnectionCheck {
        let result = match self {
            Self::Flat(_) => Ok(()),
            Self::Qdrant(s) => s.test_connection().await,
            Self::Chroma(s) => s.test_connection().await,
        };
        match result {
            Ok(()) => ConnectionCheck::ok(format!("{} vector store reachable", self.kind())),
            Err(e) => ConnectionCheck::failed(format!("{e:#}")),
        }
    }
}

/// Longest accepted collection name. Chroma caps names at 63 characters and
/// documentation collections append `_docs`.
pub const MAX_COLLECTION_NAME: usize = 58;

/// Collection names go verbatim into file names and store URLs, so only
/// ASCII letters, digits, `-` and `_` are accepted, starting with a letter
/// or digit.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let valid = name.len() <= MAX_COLLECTION_NAME
        && name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        anyhow::bail!(
            "Invalid collection name {name:?}: use up to {MAX_COLLECTION_NAME} letters, digits, '-' or '_'"
        );
    }
    Ok(())
}

/// Apply the threshold, order by descending score and cut to `limit`.
pub(crate) fn finalize_hits(hits: &mut Vec<SearchHit>, limit: usize, threshold: f32) {
    hits.retain(|h| h.score >= threshold);
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
}

/// Cosine similarity; 0 for mismatched lengths or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
