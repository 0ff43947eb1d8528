//! Screen analysis: retrieve related code, ask the LLM for a migration plan,
//! store the result.

pub mod prompts;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::Path;
use uuid::Uuid;

use crate::llm::{parse_json_reply, LlmClient};
use crate::models::{AnalyzeRequest, Configuration};
use crate::scan::char_prefix;
use crate::state::AppState;
use crate::vector::{SearchHit, VectorStore};

const QUERY_SCAN_LINES: usize = 20;
const QUERY_MAX_CHARS: usize = 100;
const QUERY_FALLBACK_LINES: usize = 5;
const QUERY_KEYWORDS: [&str; 7] = ["SCREEN", "FORM", "FIELD", "BUTTON", "TABLE", "QUERY", "PROCEDURE"];
const MAX_QUERIES: usize = 3;
const HITS_PER_QUERY: usize = 2;
const MAX_CONTEXT_HITS: usize = 5;
/// Characters of the raw reply kept on a failed analysis.
const RAW_ON_FAILURE_CHARS: usize = 500;

// ─── Plan ────────────────────────────────────────────────

/// Migration plan returned by the LLM. Every field defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigrationPlan {
    pub analysis_summary: String,
    pub file_type: String,
    pub complexity: String,
    #[serde(deserialize_with = "number_or_string")]
    pub estimated_hours: f64,
    pub frontend: FrontendPlan,
    pub backend: BackendPlan,
    #[serde(deserialize_with = "string_list")]
    pub migration_notes: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub potential_issues: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FrontendPlan {
    pub component_type: String,
    pub fields: Vec<Value>,
    pub buttons: Vec<Value>,
    #[serde(deserialize_with = "string_list")]
    pub angular_components: Vec<String>,
    pub routing: Value,
    #[serde(deserialize_with = "string_list")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendPlan {
    pub entity_name: String,
    pub database_table: String,
    pub fields: Vec<Value>,
    pub endpoints: Vec<Value>,
    #[serde(deserialize_with = "string_list")]
    pub business_logic: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    pub spring_annotations: Vec<String>,
}

/// `8`, `"8"`, `"8.5 hours"` and `"6-10"` all read as a number (the first one).
fn number_or_string<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => leading_number(&s).unwrap_or(0.0),
        _ => 0.0,
    })
}

fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().ok()
}

/// A list of strings; a lone string becomes one entry and non-string
/// entries are rendered as JSON.
fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let render = |v: Value| match v {
        Value::String(s) => s,
        other => other.to_string(),
    };
    Ok(match Value::deserialize(d)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().filter(|v| !v.is_null()).map(render).collect(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        other => vec![render(other)],
    })
}

// ─── Records ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            _ => Self::Failed,
        }
    }
}

/// A stored analysis of one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub configuration_id: Option<Uuid>,
    pub repo_name: Option<String>,
    pub file_path: String,
    pub file_name: String,
    pub status: AnalysisStatus,
    pub plan: Option<MigrationPlan>,
    pub raw_response: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The screen to analyze, resolved from a request.
#[derive(Debug, Clone)]
pub struct ScreenSource {
    pub repo_name: Option<String>,
    pub file_path: String,
    pub file_name: String,
    pub content: String,
}

impl ScreenSource {
    /// Inline content wins; otherwise the file is read from a cloned repository.
    pub fn resolve(repos_dir: &Path, req: AnalyzeRequest) -> Result<Self> {
        if let Some(content) = req.content {
            let file_name = req
                .file_name
                .or_else(|| {
                    req.file_path
                        .as_deref()
                        .and_then(|p| Path::new(p).file_name())
                        .map(|f| f.to_string_lossy().to_string())
                })
                .filter(|n| !n.trim().is_empty())
                .context("file_name is required with inline content")?;
            return Ok(Self {
                repo_name: req.repo_name,
                file_path: req.file_path.unwrap_or_else(|| file_name.clone()),
                file_name,
                content,
            });
        }

        let repo_name = req
            .repo_name
            .context("repo_name is required when content is not provided")?;
        let file_path = req.file_path.context("file_path is required")?;
        crate::git::validate_repo_name(&repo_name)?;
        let repo_dir = repos_dir.join(&repo_name);
        let path = crate::git::safe_join(&repo_dir, &file_path)?;
        let bytes = std::fs::read(&path).with_context(|| format!("File not found: {file_path}"))?;
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| file_path.clone());

        Ok(Self {
            repo_name: Some(repo_name),
            file_path,
            file_name,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

// ─── Pipeline ────────────────────────────────────────────

/// Search queries for retrieving related code: keyword lines from the head of
/// the file, else the non-empty lines among its first few lines.
pub fn extract_search_queries(content: &str) -> Vec<String> {
    let head = |n: usize| {
        content
            .lines()
            .take(n)
            .map(str::trim)
            .filter(|l| !l.is_empty())
    };

    let keyword_lines: Vec<String> = head(QUERY_SCAN_LINES)
        .filter(|line| {
            let upper = line.to_uppercase();
            QUERY_KEYWORDS.iter().any(|k| upper.contains(k))
        })
        .map(|line| char_prefix(line, QUERY_MAX_CHARS).to_string())
        .collect();

    if !keyword_lines.is_empty() {
        return keyword_lines;
    }
    head(QUERY_FALLBACK_LINES)
        .map(|line| char_prefix(line, QUERY_MAX_CHARS).to_string())
        .collect()
}

/// Up to [`MAX_CONTEXT_HITS`] related snippets. Failures only degrade the context.
pub async fn gather_context(
    llm: &LlmClient,
    store: &VectorStore,
    threshold: f32,
    content: &str,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = Vec::new();
    for query in extract_search_queries(content).into_iter().take(MAX_QUERIES) {
        let result: Result<Vec<SearchHit>> = async {
            let embedding = llm.embed(&query).await?;
            store.search(&embedding, HITS_PER_QUERY, threshold).await
        }
        .await;
        match result {
            Ok(found) => {
                for hit in found {
                    if hits.len() < MAX_CONTEXT_HITS && !hits.iter().any(|h| h.id == hit.id) {
                        hits.push(hit);
                    }
                }
            }
            Err(e) => tracing::warn!("Context search failed for {:?}: {e:#}", query),
        }
        if hits.len() >= MAX_CONTEXT_HITS {
            break;
        }
    }
    hits
}

/// Turn an LLM reply into a record: a parsed plan, or a failure with the
/// head of the raw reply.
pub fn record_from_reply(config_id: Option<Uuid>, source: &ScreenSource, reply: &str) -> AnalysisRecord {
    let mut record = AnalysisRecord {
        id: Uuid::new_v4(),
        configuration_id: config_id,
        repo_name: source.repo_name.clone(),
        file_path: source.file_path.clone(),
        file_name: source.file_name.clone(),
        status: AnalysisStatus::Completed,
        plan: None,
        raw_response: reply.to_string(),
        error: None,
        created_at: Utc::now(),
    };
    match parse_json_reply::<MigrationPlan>(reply) {
        Ok(plan) => record.plan = Some(plan),
        Err(e) => {
            tracing::warn!("Could not parse migration plan for {}: {e:#}", source.file_name);
            record.status = AnalysisStatus::Failed;
            record.error = Some(format!("{e:#}"));
            record.raw_response = char_prefix(reply, RAW_ON_FAILURE_CHARS).to_string();
        }
    }
    record
}

/// Analyze one screen with the active configuration and persist the result.
pub async fn analyze(state: &AppState, config: &Configuration, source: ScreenSource) -> Result<AnalysisRecord> {
    tracing::info!("Analyzing {}", source.file_path);
    let llm = LlmClient::new(state.http_client.clone(), config.llm.clone());

    let context = match state.vector_store(&config.vector_store) {
        Ok(store) => {
            gather_context(
                &llm,
                &store,
                config.vector_store.similarity_threshold,
                &source.content,
            )
            .await
        }
        Err(e) => {
            tracing::warn!("Vector store unavailable, analyzing without context: {e:#}");
            Vec::new()
        }
    };
    tracing::debug!("{} context snippets for {}", context.len(), source.file_name);

    let messages = prompts::migration_plan_messages(&source.file_name, &source.content, &context);
    let reply = llm.chat(&messages).await.context("Migration plan request failed")?;

    let record = record_from_reply(Some(config.id), &source, &reply);
    state.db.lock().insert_analysis(&record)?;
    tracing::info!(
        "Analysis {} of {} stored ({})",
        record.id,
        record.file_name,
        record.status.as_str()
    );
    Ok(record)
}
