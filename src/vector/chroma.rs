use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{check_response, SearchHit, VectorPayload, VectorRecord, VectorStoreStats};
use crate::models::VectorStoreKind;

/// Chroma collection over the v1 REST API. Chroma only accepts scalar
/// metadata, so patterns travel as a JSON string.
pub struct ChromaStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

#[derive(Deserialize)]
struct CollectionRef {
    id: String,
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
}

impl ChromaStore {
    pub fn new(client: reqwest::Client, base_url: String, collection: String) -> Self {
        Self {
            client,
            base_url,
            collection,
        }
    }

    /// Get or create the collection (cosine space) and return its id.
    pub async fn initialize(&self) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/api/v1/collections", self.base_url))
            .json(&json!({
                "name": self.collection,
                "metadata": { "hnsw:space": "cosine" },
                "get_or_create": true,
            }))
            .send()
            .await
            .context("Failed to reach Chroma")?;
        let collection: CollectionRef = check_response(resp, "Chroma get_or_create")
            .await?
            .json()
            .await
            .context("Failed to parse Chroma collection")?;
        // the id is spliced into request paths
        uuid::Uuid::parse_str(&collection.id)
            .with_context(|| format!("Chroma returned a malformed collection id {:?}", collection.id))?;
        Ok(collection.id)
    }

    pub async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let id = self.initialize().await?;
        let mut ids = Vec::with_capacity(records.len());
        let mut embeddings = Vec::with_capacity(records.len());
        let mut metadatas = Vec::with_capacity(records.len());
        let mut documents = Vec::with_capacity(records.len());
        for record in records {
            ids.push(record.id);
            metadatas.push(flatten_payload(&record.payload));
            documents.push(record.payload.content_preview);
            embeddings.push(record.embedding);
        }

        let resp = self
            .client
            .post(format!("{}/api/v1/collections/{}/upsert", self.base_url, id))
            .json(&json!({
                "ids": ids,
                "embeddings": embeddings,
                "metadatas": metadatas,
                "documents": documents,
            }))
            .send()
            .await
            .context("Failed to upsert into Chroma")?;
        check_response(resp, "Chroma upsert").await?;
        Ok(())
    }

    /// Cosine distances come back as `1 - similarity`.
    pub async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let id = self.initialize().await?;
        let resp = self
            .client
            .post(format!("{}/api/v1/collections/{}/query", self.base_url, id))
            .json(&json!({
                "query_embeddings": [query],
                "n_results": limit,
                "include": ["metadatas", "documents", "distances"],
            }))
            .send()
            .await
            .context("Failed to query Chroma")?;
        let body: QueryResponse = check_response(resp, "Chroma query")
            .await?
            .json()
            .await
            .context("Failed to parse Chroma query response")?;
        Ok(parse_query(body))
    }

    pub async fn stats(&self) -> Result<VectorStoreStats> {
        let id = self.initialize().await?;
        let resp = self
            .client
            .get(format!("{}/api/v1/collections/{}/count", self.base_url, id))
            .send()
            .await
            .context("Failed to reach Chroma")?;
        let count: u64 = check_response(resp, "Chroma count")
            .await?
            .json()
            .await
            .context("Failed to parse Chroma count")?;
        Ok(VectorStoreStats {
            kind: VectorStoreKind::Chroma,
            collection: self.collection.clone(),
            vector_count: count,
            dimension: None,
        })
    }

    pub async fn clear(&self) -> Result<()> {
        let resp = self
            .client
            .delete(format!("{}/api/v1/collections/{}", self.base_url, self.collection))
            .send()
            .await
            .context("Failed to delete Chroma collection")?;
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            check_response(resp, "Chroma delete collection").await?;
        }
        self.initialize().await.map(|_| ())
    }

    pub async fn test_connection(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/api/v1/heartbeat", self.base_url))
            .send()
            .await
            .context("Failed to reach Chroma")?;
        check_response(resp, "Chroma heartbeat").await?;
        Ok(())
    }
}

fn flatten_payload(payload: &VectorPayload) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("repo".into(), payload.repo.clone().into());
    meta.insert("path".into(), payload.path.clone().into());
    meta.insert("file_name".into(), payload.file_name.clone().into());
    meta.insert("kind".into(), payload.kind.clone().into());
    meta.insert("technology".into(), payload.technology.clone().into());
    meta.insert("module".into(), payload.module.clone().into());
    meta.insert(
        "patterns".into(),
        serde_json::to_string(&payload.patterns)
            .unwrap_or_default()
            .into(),
    );
    meta
}

fn unflatten_payload(meta: &Map<String, Value>, document: Option<String>) -> VectorPayload {
    let text = |key: &str| {
        meta.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    VectorPayload {
        repo: text("repo"),
        path: text("path"),
        file_name: text("file_name"),
        kind: text("kind"),
        technology: text("technology"),
        module: text("module"),
        content_preview: document.unwrap_or_default(),
        patterns: meta
            .get("patterns")
            .and_then(Value::as_str)
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default(),
    }
}

fn parse_query(body: QueryResponse) -> Vec<SearchHit> {
    let ids = body.ids.into_iter().next().unwrap_or_default();
    let distances = body
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();
    let mut metadatas = body
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default()
        .into_iter();
    let mut documents = body
        .documents
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default()
        .into_iter();

    ids.into_iter()
        .enumerate()
        .map(|(i, id)| {
            let meta = metadatas.next().flatten().unwrap_or_default();
            let document = documents.next().flatten();
            SearchHit {
                id,
                score: 1.0 - distances.get(i).copied().unwrap_or(1.0),
                payload: unflatten_payload(&meta, document),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::VectorStore;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{Method, StatusCode, Uri};
    use axum::Router;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// In-memory stand-in for a Chroma server holding one collection `nsdk`.
    #[derive(Default)]
    struct FakeChroma {
        requests: Vec<String>,
        collection_id: Option<String>,
        create_body: Option<Value>,
        last_upsert: Option<Value>,
        ids: Vec<String>,
    }

    type Shared = Arc<Mutex<FakeChroma>>;

    async fn handle(
        State(fake): State<Shared>,
        method: Method,
        uri: Uri,
        body: Bytes,
    ) -> (StatusCode, axum::Json<Value>) {
        let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        let mut f = fake.lock();
        f.requests.push(format!("{method} {}", uri.path()));
        let segments: Vec<&str> = uri.path().trim_start_matches("/api/v1/").split('/').collect();
        let current = f.collection_id.clone();
        let is_current = |id: &str| current.as_deref() == Some(id);

        match (method.as_str(), segments.as_slice()) {
            ("GET", ["heartbeat"]) => (StatusCode::OK, axum::Json(json!({ "nanosecond heartbeat": 1 }))),
            ("POST", ["collections"]) => {
                let id = current.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                f.collection_id = Some(id.clone());
                f.create_body = Some(body);
                (StatusCode::OK, axum::Json(json!({ "id": id, "name": "nsdk" })))
            }
            ("DELETE", ["collections", "nsdk"]) if current.is_some() => {
                f.collection_id = None;
                f.ids.clear();
                (StatusCode::OK, axum::Json(Value::Null))
            }
            ("POST", ["collections", id, "upsert"]) if is_current(*id) => {
                for new_id in body["ids"].as_array().cloned().unwrap_or_default() {
                    let new_id = new_id.as_str().unwrap_or_default().to_string();
                    if !f.ids.contains(&new_id) {
                        f.ids.push(new_id);
                    }
                }
                f.last_upsert = Some(body);
                (StatusCode::OK, axum::Json(Value::Bool(true)))
            }
            ("GET", ["collections", id, "count"]) if is_current(*id) => {
                (StatusCode::OK, axum::Json(json!(f.ids.len())))
            }
            ("POST", ["collections", id, "query"]) if is_current(*id) => (
                StatusCode::OK,
                axum::Json(json!({
                    "ids": [["a", "b", "c"]],
                    "distances": [[0.1, 0.6, 0.25]],
                    "metadatas": [[{ "path": "A.SCR" }, { "path": "B.SCR" }, { "path": "C.SCR" }]],
                    "documents": [["SCREEN a", "SCREEN b", "SCREEN c"]],
                })),
            ),
            _ => (StatusCode::NOT_FOUND, axum::Json(json!({ "error": "not found" }))),
        }
    }

    async fn fake_chroma() -> (ChromaStore, Shared) {
        let fake: Shared = Arc::new(Mutex::new(FakeChroma::default()));
        let app = Router::new().fallback(handle).with_state(fake.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let store = ChromaStore::new(reqwest::Client::new(), format!("http://{addr}"), "nsdk".into());
        (store, fake)
    }

    fn record(path: &str) -> VectorRecord {
        let mut payload = VectorPayload {
            repo: "app".into(),
            path: path.into(),
            content_preview: format!("preview of {path}"),
            ..VectorPayload::default()
        };
        payload.patterns.insert("fields".into(), vec!["name:char".into()]);
        VectorRecord {
            id: VectorRecord::record_id("app", path),
            embedding: vec![0.5, 0.5],
            payload,
        }
    }

    #[tokio::test]
    async fn test_initialize_gets_or_creates_cosine_collection() {
        let (store, fake) = fake_chroma().await;
        let first = store.initialize().await.unwrap();
        let second = store.initialize().await.unwrap();
        assert_eq!(first, second);

        let f = fake.lock();
        let body = f.create_body.clone().unwrap();
        assert_eq!(body["name"], "nsdk");
        assert_eq!(body["get_or_create"], true);
        assert_eq!(body["metadata"]["hnsw:space"], "cosine");
    }

    #[tokio::test]
    async fn test_upsert_sends_scalar_metadata_and_previews() {
        let (store, fake) = fake_chroma().await;
        let store = VectorStore::Chroma(store);
        store
            .upsert(vec![record("A.SCR"), record("B.SCR")], 2)
            .await
            .unwrap();

        let upsert = fake.lock().last_upsert.clone().unwrap();
        assert_eq!(upsert["documents"][0], "preview of A.SCR");
        let metadatas = upsert["metadatas"].as_array().unwrap();
        assert_eq!(metadatas.len(), 2);
        for meta in metadatas {
            assert!(meta.as_object().unwrap().values().all(Value::is_string));
        }

        // Same id again replaces
        store.upsert(vec![record("A.SCR")], 2).await.unwrap();
        assert_eq!(store.stats().await.unwrap().vector_count, 2);
    }

    #[tokio::test]
    async fn test_search_converts_distance_and_applies_threshold() {
        let (store, _fake) = fake_chroma().await;
        let hits = VectorStore::Chroma(store).search(&[0.5, 0.5], 5, 0.7).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!((hits[0].score - 0.9).abs() < 1e-6);
        assert!((hits[1].score - 0.75).abs() < 1e-6);
        assert_eq!(hits[1].payload.path, "C.SCR");
    }

    #[tokio::test]
    async fn test_clear_drops_and_recreates() {
        let (store, fake) = fake_chroma().await;
        store.upsert(vec![record("A.SCR")]).await.unwrap();
        let before = fake.lock().collection_id.clone().unwrap();
        fake.lock().requests.clear();

        store.clear().await.unwrap();
        assert_eq!(
            fake.lock().requests,
            vec!["DELETE /api/v1/collections/nsdk", "POST /api/v1/collections"]
        );
        let after = fake.lock().collection_id.clone().unwrap();
        assert_ne!(before, after);
        assert_eq!(store.stats().await.unwrap().vector_count, 0);
    }

    #[tokio::test]
    async fn test_heartbeat() {
        let (store, fake) = fake_chroma().await;
        store.test_connection().await.unwrap();
        assert_eq!(fake.lock().requests, vec!["GET /api/v1/heartbeat"]);
    }

    #[test]
    fn test_payload_round_trips_through_flat_metadata() {
        let mut payload = VectorPayload {
            repo: "app".into(),
            path: "ui/A.SCR".into(),
            file_name: "A.SCR".into(),
            kind: "scr".into(),
            technology: "nsdk".into(),
            module: "ui".into(),
            content_preview: "SCREEN a".into(),
            ..VectorPayload::default()
        };
        payload
            .patterns
            .insert("buttons".into(), vec!["ok".into(), "cancel".into()]);

        let meta = flatten_payload(&payload);
        assert!(meta.values().all(|v| v.is_string()));
        let back = unflatten_payload(&meta, Some("SCREEN a".into()));
        assert_eq!(back, payload);
    }

    #[test]
    fn test_parse_query_converts_distance_to_similarity() {
        let body: QueryResponse = serde_json::from_value(json!({
            "ids": [["a", "b"]],
            "distances": [[0.1, 0.4]],
            "metadatas": [[{"path": "A.SCR"}, null]],
            "documents": [["doc a", null]],
        }))
        .unwrap();
        let hits = parse_query(body);
        assert_eq!(hits.len(), 2);
        assert!((hits[0].score - 0.9).abs() < 1e-6);
        assert!((hits[1].score - 0.6).abs() < 1e-6);
        assert_eq!(hits[0].payload.path, "A.SCR");
        assert_eq!(hits[0].payload.content_preview, "doc a");
        assert_eq!(hits[1].payload.path, "");
    }
}
