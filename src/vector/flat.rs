use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};

use super::{cosine_similarity, validate_collection_name, SearchHit, VectorRecord, VectorStoreStats};
use crate::models::VectorStoreKind;

/// In-memory brute-force cosine index persisted as one JSON file per collection.
pub struct FlatIndex {
    collection: String,
    dimension: usize,
    entries: RwLock<Vec<VectorRecord>>,
    persist_path: PathBuf,
}

impl FlatIndex {
    pub fn open_or_create(vector_dir: &Path, collection: &str, dimension: usize) -> Result<Self> {
        validate_collection_name(collection)?;
        std::fs::create_dir_all(vector_dir)?;
        let persist_path = vector_dir.join(format!("{collection}.json"));

        let entries: Vec<VectorRecord> = if persist_path.exists() {
            let data = std::fs::read_to_string(&persist_path)
                .with_context(|| format!("Failed to read {}", persist_path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("Corrupt vector file {}", persist_path.display()))?
        } else {
            Vec::new()
        };

        if let Some(stale) = entries.iter().find(|e| e.embedding.len() != dimension) {
            tracing::warn!(
                "Collection {} holds {}-dim vectors but {} is configured",
                collection,
                stale.embedding.len(),
                dimension
            );
        }

        Ok(Self {
            collection: collection.to_string(),
            dimension,
            entries: RwLock::new(entries),
            persist_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.persist_path
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Replace records with matching ids, append the rest.
    pub fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut entries = self.entries.write();
        for record in records {
            match entries.iter_mut().find(|e| e.id == record.id) {
                Some(existing) => *existing = record,
                None => entries.push(record),
            }
        }
        self.persist(&entries)
    }

    pub fn search(&self, query: &[f32], limit: usize, threshold: f32) -> Vec<SearchHit> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &VectorRecord)> = entries
            .iter()
            .map(|e| (cosine_similarity(query, &e.embedding), e))
            .filter(|(score, _)| *score >= threshold)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, e)| SearchHit {
                id: e.id.clone(),
                score,
                payload: e.payload.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> VectorStoreStats {
        VectorStoreStats {
            kind: VectorStoreKind::Faiss,
            collection: self.collection.clone(),
            vector_count: self.len() as u64,
            dimension: Some(self.dimension),
        }
    }

    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write();
        entries.clear();
        self.persist(&entries)
    }

    /// Atomic write via temp file + rename.
    fn persist(&self, entries: &[VectorRecord]) -> Result<()> {
        let data = serde_json::to_string(entries)?;
        let tmp_path = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.persist_path)?;
        Ok(())
    }
}
