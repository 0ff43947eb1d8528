use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::git::GitGate;
use crate::llm::LlmClient;
use crate::models::{Configuration, VectorStoreKind, VectorStoreSettings};
use crate::vector::{FlatIndex, VectorStore};
use crate::vectorize::BatchRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Arc<Mutex<Database>>,
    pub batches: Arc<BatchRegistry>,
    pub http_client: reqwest::Client,
    /// Clone concurrency and per-repository locking
    pub git: Arc<GitGate>,
    /// Open flat indexes by collection name
    flat_indexes: Arc<Mutex<HashMap<String, Arc<FlatIndex>>>>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(config.repos_dir())?;
        std::fs::create_dir_all(config.vector_dir())?;
        let db = Database::open(&config.db_path())?;
        let interrupted = db.fail_interrupted_documents()?;
        if interrupted > 0 {
            tracing::warn!("Marked {} interrupted document ingestions as failed", interrupted);
        }
        Self::with_database(config, db)
    }

    pub fn with_database(config: Config, db: Database) -> Result<Self> {
        let git = Arc::new(GitGate::new(config.max_concurrent_clones));
        Ok(Self {
            config,
            db: Arc::new(Mutex::new(db)),
            batches: Arc::new(BatchRegistry::new()),
            http_client: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            git,
            flat_indexes: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn llm(&self, config: &Configuration) -> LlmClient {
        LlmClient::new(self.http_client.clone(), config.llm.clone())
    }

    /// The configured vector store. Flat indexes stay open for the life of
    /// the process and are reopened when the configured dimension changes.
    pub fn vector_store(&self, settings: &VectorStoreSettings) -> Result<VectorStore> {
        if settings.kind != VectorStoreKind::Faiss {
            return VectorStore::remote(settings, self.http_client.clone());
        }

        let mut indexes = self.flat_indexes.lock();
        if let Some(index) = indexes.get(&settings.collection_name) {
            if index.dimension() == settings.dimension {
                return Ok(VectorStore::Flat(index.clone()));
            }
        }
        let index = Arc::new(FlatIndex::open_or_create(
            &self.config.vector_dir(),
            &settings.collection_name,
            settings.dimension,
        )?);
        tracing::info!(
            "Opened flat index {} ({} vectors)",
            settings.collection_name,
            index.len()
        );
        indexes.insert(settings.collection_name.clone(), index.clone());
        Ok(VectorStore::Flat(index))
    }

    /// The active configuration, if any.
    pub fn active_configuration(&self) -> Result<Option<Configuration>> {
        self.db.lock().active_configuration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(dir: &std::path::Path) -> AppState {
        let config = Config {
            data_dir: dir.to_path_buf(),
            ..Config::default()
        };
        AppState::with_database(config, Database::in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_flat_index_is_shared_per_collection() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let settings = VectorStoreSettings {
            dimension: 3,
            ..VectorStoreSettings::default()
        };

        let (VectorStore::Flat(a), VectorStore::Flat(b)) = (
            state.vector_store(&settings).unwrap(),
            state.vector_store(&settings).unwrap(),
        ) else {
            panic!("expected flat stores");
        };
        assert!(Arc::ptr_eq(&a, &b));

        let resized = VectorStoreSettings {
            dimension: 4,
            ..settings
        };
        let VectorStore::Flat(c) = state.vector_store(&resized).unwrap() else {
            panic!("expected flat store");
        };
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.dimension(), 4);
    }

    #[test]
    fn test_remote_store_selection() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let settings = VectorStoreSettings {
            kind: VectorStoreKind::Qdrant,
            ..VectorStoreSettings::default()
        };
        assert_eq!(state.vector_store(&settings).unwrap().kind(), VectorStoreKind::Qdrant);
        assert!(state.active_configuration().unwrap().is_none());
    }
}
