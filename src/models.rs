use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ─── Enumerations ────────────────────────────────────────

/// LLM provider used for chat completions and embeddings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[default]
    Ollama,
    Mistral,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Ollama => "ollama",
            LlmProvider::Mistral => "mistral",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com",
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Mistral => "https://api.mistral.ai",
        }
    }

    /// Cloud providers authenticate with a bearer key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, LlmProvider::OpenAi | LlmProvider::Mistral)
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vector store backend. `faiss` selects the local flat cosine index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreKind {
    #[default]
    Faiss,
    Qdrant,
    Chroma,
}

impl VectorStoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorStoreKind::Faiss => "faiss",
            VectorStoreKind::Qdrant => "qdrant",
            VectorStoreKind::Chroma => "chroma",
        }
    }

    pub fn default_connection_string(&self) -> Option<&'static str> {
        match self {
            VectorStoreKind::Faiss => None,
            VectorStoreKind::Qdrant => Some("http://localhost:6333"),
            VectorStoreKind::Chroma => Some("http://localhost:8000"),
        }
    }
}

impl fmt::Display for VectorStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ecosystem a repository is written in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    Nsdk,
    Angular,
    Spring,
    Unknown,
}

impl Technology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Technology::Nsdk => "nsdk",
            Technology::Angular => "angular",
            Technology::Spring => "spring",
            Technology::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Configuration ───────────────────────────────────────

/// Git coordinates and credentials for one repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryConfig {
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl RepositoryConfig {
    /// Username/token pair, only when both are present.
    pub fn credentials(&self) -> Option<crate::git::GitCredentials> {
        match (&self.username, &self.token) {
            (Some(username), Some(token)) if !username.is_empty() && !token.is_empty() => {
                Some(crate::git::GitCredentials {
                    username: username.clone(),
                    token: token.clone(),
                })
            }
            _ => None,
        }
    }

    /// Local directory name derived from the URL.
    pub fn repo_name(&self) -> String {
        repo_name_from_url(&self.url)
    }
}

/// Derive a repository directory name from its URL (`.../foo.git` -> `foo`).
pub fn repo_name_from_url(url: &str) -> String {
    let name = url
        .trim()
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or("repo")
        .trim_end_matches(".git");
    if name.is_empty() {
        "repo".to_string()
    } else {
        name.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Provider default is used when absent
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_chat_model() -> String {
    "llama3.2".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    4000
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            api_key: None,
            base_url: None,
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl LlmSettings {
    pub fn effective_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorStoreSettings {
    #[serde(default)]
    pub kind: VectorStoreKind,
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default = "default_collection")]
    pub collection_name: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,
}

fn default_collection() -> String {
    "nsdk-embeddings".to_string()
}

fn default_dimension() -> usize {
    1536
}

fn default_threshold() -> f32 {
    0.7
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            kind: VectorStoreKind::default(),
            connection_string: None,
            collection_name: default_collection(),
            dimension: default_dimension(),
            similarity_threshold: default_threshold(),
        }
    }
}

impl VectorStoreSettings {
    pub fn effective_connection_string(&self) -> Option<String> {
        self.connection_string
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or(self.kind.default_connection_string())
            .map(|c| c.trim_end_matches('/').to_string())
    }
}

/// A stored migration configuration. At most one is active at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub id: Uuid,
    pub name: String,
    pub source_repo: RepositoryConfig,
    pub frontend_repo: Option<RepositoryConfig>,
    pub backend_repo: Option<RepositoryConfig>,
    pub llm: LlmSettings,
    pub vector_store: VectorStoreSettings,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Configuration {
    pub fn new(req: ConfigurationRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: req.name,
            source_repo: req.source_repo,
            frontend_repo: req.frontend_repo,
            backend_repo: req.backend_repo,
            llm: req.llm,
            vector_store: req.vector_store,
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the editable fields. Secrets omitted from the request keep
    /// their stored values.
    pub fn apply(&mut self, req: ConfigurationRequest) {
        let old_key = self.llm.api_key.take();
        let old_source_token = self.source_repo.token.take();
        let old_frontend_token = self.frontend_repo.as_mut().and_then(|r| r.token.take());
        let old_backend_token = self.backend_repo.as_mut().and_then(|r| r.token.take());

        self.name = req.name;
        self.source_repo = req.source_repo;
        self.frontend_repo = req.frontend_repo;
        self.backend_repo = req.backend_repo;
        self.llm = req.llm;
        self.vector_store = req.vector_store;

        if self.llm.api_key.is_none() {
            self.llm.api_key = old_key;
        }
        if self.source_repo.token.is_none() {
            self.source_repo.token = old_source_token;
        }
        if let Some(repo) = self.frontend_repo.as_mut() {
            if repo.token.is_none() {
                repo.token = old_frontend_token;
            }
        }
        if let Some(repo) = self.backend_repo.as_mut() {
            if repo.token.is_none() {
                repo.token = old_backend_token;
            }
        }
        self.updated_at = Utc::now();
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Configuration name is required");
        }
        if self.source_repo.url.trim().is_empty() {
            anyhow::bail!("Source repository URL is required");
        }
        if self.llm.provider.requires_api_key()
            && self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            anyhow::bail!("LLM provider {} requires an API key", self.llm.provider);
        }
        if self.llm.provider == LlmProvider::Ollama
            && self.llm.base_url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            anyhow::bail!("LLM provider ollama requires a base URL");
        }
        if self.vector_store.dimension == 0 {
            anyhow::bail!("Vector dimension must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.vector_store.similarity_threshold) {
            anyhow::bail!("Similarity threshold must be between 0 and 1");
        }
        if self.vector_store.collection_name.trim().is_empty() {
            anyhow::bail!("Collection name is required");
        }
        crate::vector::validate_collection_name(&self.vector_store.collection_name)?;
        Ok(())
    }

    /// Credentials of whichever configured repository has this URL.
    pub fn credentials_for(&self, url: &str) -> Option<crate::git::GitCredentials> {
        let url = url.trim().trim_end_matches('/');
        [
            Some(&self.source_repo),
            self.frontend_repo.as_ref(),
            self.backend_repo.as_ref(),
        ]
        .into_iter()
        .flatten()
        .find(|r| r.url.trim().trim_end_matches('/') == url)
        .and_then(|r| r.credentials())
    }
}

/// Create/replace body for a configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigurationRequest {
    pub name: String,
    pub source_repo: RepositoryConfig,
    #[serde(default)]
    pub frontend_repo: Option<RepositoryConfig>,
    #[serde(default)]
    pub backend_repo: Option<RepositoryConfig>,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub vector_store: VectorStoreSettings,
}

/// Configuration as returned by the API (secrets redacted).
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationView {
    pub id: Uuid,
    pub name: String,
    pub source_repo: RepositoryView,
    pub frontend_repo: Option<RepositoryView>,
    pub backend_repo: Option<RepositoryView>,
    pub llm: LlmSettingsView,
    pub vector_store: VectorStoreSettings,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryView {
    pub url: String,
    pub branch: String,
    pub username: Option<String>,
    pub has_token: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmSettingsView {
    pub provider: LlmProvider,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub has_api_key: bool,
}

impl From<&RepositoryConfig> for RepositoryView {
    fn from(r: &RepositoryConfig) -> Self {
        Self {
            url: r.url.clone(),
            branch: r.branch.clone(),
            username: r.username.clone(),
            has_token: r.token.is_some(),
        }
    }
}

impl From<&Configuration> for ConfigurationView {
    fn from(c: &Configuration) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            source_repo: (&c.source_repo).into(),
            frontend_repo: c.frontend_repo.as_ref().map(Into::into),
            backend_repo: c.backend_repo.as_ref().map(Into::into),
            llm: LlmSettingsView {
                provider: c.llm.provider,
                base_url: c.llm.effective_base_url(),
                chat_model: c.llm.chat_model.clone(),
                embedding_model: c.llm.embedding_model.clone(),
                temperature: c.llm.temperature,
                max_tokens: c.llm.max_tokens,
                has_api_key: c.llm.api_key.is_some(),
            },
            vector_store: c.vector_store.clone(),
            is_active: c.is_active,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Result of probing an external service.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionCheck {
    pub ok: bool,
    pub message: String,
}

impl ConnectionCheck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

// ─── Request / response bodies ───────────────────────────

/// Clone (or refresh) a repository into the working directory.
#[derive(Debug, Clone, Deserialize)]
pub struct CloneRepositoryRequest {
    pub url: String,
    /// Defaults to the name derived from the URL
    pub name: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRepositoryRequest {
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// Start a vectorization run. Missing fields fall back to the active
/// configuration's source repository.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VectorizeRequest {
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    /// Skip detection and scan as this technology
    pub technology: Option<Technology>,
    /// Restrict the run to a sub-directory of the repository
    pub module_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Defaults to the configured similarity threshold
    pub threshold: Option<f32>,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<crate::vector::SearchHit>,
}

/// Analyze a screen either from a cloned repository or from inline content.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub repo_name: Option<String>,
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub target: crate::codegen::GenerationTarget,
    /// Defaults to the server-wide push setting
    pub push: Option<bool>,
}

/// Documentation text to chunk and embed, e.g. text extracted from a PDF
/// manual.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentRequest {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocQueryRequest {
    pub query: String,
    #[serde(default = "default_doc_limit")]
    pub limit: usize,
    pub threshold: Option<f32>,
}

fn default_doc_limit() -> usize {
    crate::docs::DEFAULT_QUERY_LIMIT
}

#[derive(Debug, Clone, Serialize)]
pub struct DocQueryResponse {
    pub query: String,
    pub snippets: Vec<crate::docs::DocSnippet>,
    /// Snippets as they appear in generation prompts
    pub context: String,
}

/// A single chat turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingResponse {
    pub dimension: usize,
    pub embedding: Vec<f32>,
}
