use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process-level settings. Per-run LLM and vector store settings live in the
/// active [`crate::models::Configuration`] stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where cloned repositories, vectors and the database are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Maximum concurrent clone/pull operations
    pub max_concurrent_clones: usize,
    /// Clone/pull timeout in seconds
    pub clone_timeout_secs: u64,
    /// Maximum embedding requests in flight during one vectorization run
    pub embed_concurrency: usize,
    /// Files larger than this are skipped during discovery
    pub max_file_size_kb: u64,
    /// Java package used for generated Spring Boot sources
    pub java_package: String,
    /// Push generated branches to `origin`
    pub push_branches: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:9100".to_string(),
            max_concurrent_clones: 2,
            clone_timeout_secs: 300,
            embed_concurrency: 4,
            max_file_size_kb: 1024,
            java_package: "com.example.nsdk".to_string(),
            push_branches: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("NSDK_MIGRATOR_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("NSDK_MIGRATOR_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(val) = std::env::var("NSDK_MIGRATOR_MAX_CONCURRENT_CLONES") {
            if let Ok(v) = val.parse::<usize>() {
                config.max_concurrent_clones = v.max(1);
            }
        }
        if let Ok(val) = std::env::var("NSDK_MIGRATOR_CLONE_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.clone_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("NSDK_MIGRATOR_EMBED_CONCURRENCY") {
            if let Ok(v) = val.parse::<usize>() {
                config.embed_concurrency = v.clamp(1, 32);
            }
        }
        if let Ok(val) = std::env::var("NSDK_MIGRATOR_MAX_FILE_SIZE_KB") {
            if let Ok(v) = val.parse() {
                config.max_file_size_kb = v;
            }
        }
        if let Ok(pkg) = std::env::var("NSDK_MIGRATOR_JAVA_PACKAGE") {
            if !pkg.trim().is_empty() {
                config.java_package = pkg.trim().to_string();
            }
        }
        if let Ok(val) = std::env::var("NSDK_MIGRATOR_PUSH_BRANCHES") {
            config.push_branches = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.data_dir.join("repositories")
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("migrator.db")
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_kb * 1024
    }
}
