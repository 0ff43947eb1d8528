use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;

use super::{check_response, SearchHit, VectorPayload, VectorRecord, VectorStoreStats};
use crate::models::VectorStoreKind;

const UPSERT_BATCH: usize = 100;

/// Qdrant collection over its REST API.
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: serde_json::Value,
    score: f32,
    #[serde(default)]
    payload: Option<VectorPayload>,
}

#[derive(Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    points_count: Option<u64>,
    #[serde(default)]
    config: Option<serde_json::Value>,
}

impl QdrantStore {
    pub fn new(client: reqwest::Client, base_url: String, collection: String, dimension: usize) -> Self {
        Self {
            client,
            base_url,
            collection,
            dimension,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    /// Create the collection with cosine distance unless it exists.
    pub async fn initialize(&self) -> Result<()> {
        let resp = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .context("Failed to reach Qdrant")?;
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            check_response(resp, "Qdrant collection lookup").await?;
            return Ok(());
        }

        tracing::info!(
            "Creating Qdrant collection {} (dim {})",
            self.collection,
            self.dimension
        );
        let resp = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": self.dimension, "distance": "Cosine" }
            }))
            .send()
            .await
            .context("Failed to create Qdrant collection")?;
        check_response(resp, "Qdrant create collection").await?;
        Ok(())
    }

    pub async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let url = format!("{}/points?wait=true", self.collection_url());
        for batch in records.chunks(UPSERT_BATCH) {
            let points: Vec<serde_json::Value> = batch
                .iter()
                .map(|r| json!({ "id": r.id, "vector": r.embedding, "payload": r.payload }))
                .collect();
            let resp = self
                .client
                .put(&url)
                .json(&json!({ "points": points }))
                .send()
                .await
                .context("Failed to upsert Qdrant points")?;
            check_response(resp, "Qdrant upsert").await?;
        }
        Ok(())
    }

    pub async fn search(&self, query: &[f32], limit: usize, threshold: f32) -> Result<Vec<SearchHit>> {
        let resp = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query,
                "limit": limit,
                "with_payload": true,
                "score_threshold": threshold,
            }))
            .send()
            .await
            .context("Failed to search Qdrant")?;
        let body: QdrantResponse<Vec<ScoredPoint>> = check_response(resp, "Qdrant search")
            .await?
            .json()
            .await
            .context("Failed to parse Qdrant search response")?;

        Ok(body
            .result
            .into_iter()
            .map(|p| SearchHit {
                id: match p.id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
                score: p.score,
                payload: p.payload.unwrap_or_default(),
            })
            .collect())
    }

    pub async fn stats(&self) -> Result<VectorStoreStats> {
        let resp = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .context("Failed to reach Qdrant")?;
        let body: QdrantResponse<CollectionInfo> = check_response(resp, "Qdrant collection info")
            .await?
            .json()
            .await
            .context("Failed to parse Qdrant collection info")?;

        let dimension = body
            .result
            .config
            .as_ref()
            .and_then(|c| c.pointer("/params/vectors/size"))
            .and_then(|v| v.as_u64())
            .map(|v| v as usize);

        Ok(VectorStoreStats {
            kind: VectorStoreKind::Qdrant,
            collection: self.collection.clone(),
            vector_count: body.result.points_count.unwrap_or(0),
            dimension,
        })
    }

    /// Drop and recreate the collection.
    pub async fn clear(&self) -> Result<()> {
        let resp = self
            .client
            .delete(self.collection_url())
            .send()
            .await
            .context("Failed to delete Qdrant collection")?;
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            check_response(resp, "Qdrant delete collection").await?;
        }
        self.initialize().await
    }

    pub async fn test_connection(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/collections", self.base_url))
            .send()
            .await
            .context("Failed to reach Qdrant")?;
        check_response(resp, "Qdrant").await?;
        Ok(())
    }
}
