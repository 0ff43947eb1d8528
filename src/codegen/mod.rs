//! Generate Angular and Spring Boot sources from a stored migration plan and
//! commit them on feature branches of the configured target repositories.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::analysis::{AnalysisRecord, AnalysisStatus, MigrationPlan};
use crate::docs;
use crate::git::{create_branch_and_commit, BranchOutcome, GitCredentials, GitGate};
use crate::llm::extract_json_object;
use crate::models::{ChatMessage, Configuration, RepositoryConfig};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTarget {
    Frontend,
    Backend,
    #[default]
    Both,
}

impl GenerationTarget {
    fn frontend(self) -> bool {
        matches!(self, Self::Frontend | Self::Both)
    }

    fn backend(self) -> bool {
        matches!(self, Self::Backend | Self::Both)
    }
}

/// File stem of an NSDK screen (`CLIENT_EDIT.SCR` -> `CLIENT_EDIT`).
pub fn screen_stem(file_name: &str) -> Result<&str> {
    let lower = file_name.to_lowercase();
    if !lower.ends_with(".scr") || file_name.len() <= 4 {
        anyhow::bail!("Code generation only supports .scr screens, got {file_name}");
    }
    Ok(&file_name[..file_name.len() - 4])
}

/// Angular file/selector name: `CLIENT_EDIT` -> `client-edit`.
pub fn component_name(stem: &str) -> String {
    stem.to_lowercase().replace('_', "-")
}

/// Class/entity name: `CLIENT_EDIT` -> `ClientEdit`.
pub fn class_name(stem: &str) -> String {
    stem.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect()
}

fn frontend_path(key: &str, component: &str) -> Option<String> {
    let feature = format!("src/app/features/{component}/{component}");
    Some(match key {
        "component_ts" => format!("{feature}.component.ts"),
        "component_html" => format!("{feature}.component.html"),
        "component_scss" => format!("{feature}.component.scss"),
        "service_ts" => format!("{feature}.service.ts"),
        "model_ts" => format!("src/app/models/{component}.model.ts"),
        _ => return None,
    })
}

fn backend_path(key: &str, entity: &str, java_package: &str) -> Option<String> {
    let base = format!("src/main/java/{}", java_package.replace('.', "/"));
    Some(match key {
        "entity_java" => format!("{base}/entity/{entity}.java"),
        "repository_java" => format!("{base}/repository/{entity}Repository.java"),
        "service_java" => format!("{base}/service/{entity}Service.java"),
        "controller_java" => format!("{base}/controller/{entity}Controller.java"),
        "dto_java" => format!("{base}/dto/{entity}DTO.java"),
        "request_dto_java" => format!("{base}/dto/{entity}RequestDTO.java"),
        "response_dto_java" => format!("{base}/dto/{entity}ResponseDTO.java"),
        _ => return None,
    })
}

/// Map the keys of a generation reply to repository paths. Unknown keys and
/// non-string values are dropped.
fn files_from_reply(reply: &str, path_for: impl Fn(&str) -> Option<String>) -> Result<Vec<(String, String)>> {
    let Value::Object(map) = extract_json_object(reply)? else {
        anyhow::bail!("LLM response JSON is not an object");
    };
    let mut files = Vec::new();
    for (key, value) in map {
        match (path_for(&key), value) {
            (Some(path), Value::String(content)) if !content.trim().is_empty() => {
                files.push((path, content))
            }
            (Some(_), _) => tracing::warn!("Ignoring non-text value for {}", key),
            (None, _) => tracing::debug!("Ignoring unknown generated key {}", key),
        }
    }
    files.sort();
    Ok(files)
}

pub fn frontend_files(reply: &str, component: &str) -> Result<Vec<(String, String)>> {
    files_from_reply(reply, |key| frontend_path(key, component))
}

pub fn backend_files(reply: &str, entity: &str, java_package: &str) -> Result<Vec<(String, String)>> {
    files_from_reply(reply, |key| backend_path(key, entity, java_package))
}

const FRONTEND_SYSTEM: &str = "You are an expert Angular and Angular Material developer. \
You write complete, compiling source files. Answer with a single JSON object and nothing else.";

const BACKEND_SYSTEM: &str = "You are an expert Spring Boot, JPA/Hibernate and REST API developer. \
You write complete, compiling source files. Answer with a single JSON object and nothing else.";

fn documentation_section(documentation: &str) -> String {
    match documentation.trim() {
        "" => String::new(),
        text => format!("## NSDK documentation\n{text}\n\n"),
    }
}

pub fn frontend_messages(
    plan: &MigrationPlan,
    file_name: &str,
    component: &str,
    class: &str,
    documentation: &str,
) -> Result<Vec<ChatMessage>> {
    let plan_json = serde_json::to_string_pretty(plan)?;
    let doc_section = documentation_section(documentation);
    let user = format!(
        "Migrate the NSDK screen `{file_name}` to Angular.\n\n\
         ## Migration plan\n{plan_json}\n\n\
         {doc_section}\
         ## Requirements\n\
         - Angular 17+ standalone components with Angular Material\n\
         - Reactive forms carrying every validation from the plan\n\
         - Every field and button from the plan\n\
         - File name prefix `{component}`, class name prefix `{class}`\n\n\
         ## Response\n\
         {{\"component_ts\": \"...\", \"component_html\": \"...\", \"component_scss\": \"...\", \
         \"service_ts\": \"...\", \"model_ts\": \"...\"}}"
    );
    Ok(vec![ChatMessage::system(FRONTEND_SYSTEM), ChatMessage::user(user)])
}

pub fn backend_messages(
    plan: &MigrationPlan,
    file_name: &str,
    entity: &str,
    table: &str,
    documentation: &str,
) -> Result<Vec<ChatMessage>> {
    let plan_json = serde_json::to_string_pretty(plan)?;
    let doc_section = documentation_section(documentation);
    let user = format!(
        "Migrate the NSDK screen `{file_name}` to Spring Boot.\n\n\
         ## Migration plan\n{plan_json}\n\n\
         {doc_section}\
         ## Requirements\n\
         - Spring Boot 3 with JPA/Hibernate persistence\n\
         - A complete REST API using DTOs for requests and responses\n\
         - Bean validation for every rule in the plan\n\
         - Entity `{entity}` mapped to table `{table}`\n\n\
         ## Response\n\
         {{\"entity_java\": \"...\", \"repository_java\": \"...\", \"service_java\": \"...\", \
         \"controller_java\": \"...\", \"dto_java\": \"...\", \"request_dto_java\": \"...\", \
         \"response_dto_java\": \"...\"}}"
    );
    Ok(vec![ChatMessage::system(BACKEND_SYSTEM), ChatMessage::user(user)])
}

/// A configured target repository that has been cloned locally.
#[derive(Debug, Clone)]
struct TargetRepo {
    name: String,
    dir: PathBuf,
    creds: Option<GitCredentials>,
}

impl TargetRepo {
    fn resolve(repos_dir: &Path, repo: Option<&RepositoryConfig>, side: &str) -> Result<Self> {
        let repo = repo.with_context(|| format!("No {side} repository configured"))?;
        let name = repo.repo_name();
        let dir = repos_dir.join(&name);
        if !dir.join(".git").exists() {
            anyhow::bail!("The {side} repository {name} has not been cloned");
        }
        Ok(Self {
            name,
            dir,
            creds: repo.credentials(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoGeneration {
    pub repository: String,
    pub files_generated: usize,
    #[serde(flatten)]
    pub outcome: BranchOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub analysis_id: Uuid,
    pub file_name: String,
    pub target: GenerationTarget,
    pub frontend: Option<RepoGeneration>,
    pub backend: Option<RepoGeneration>,
}

/// A validated generation request. Building one makes no LLM calls.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    analysis_id: Uuid,
    file_name: String,
    stem: String,
    plan: MigrationPlan,
    target: GenerationTarget,
    frontend: Option<TargetRepo>,
    backend: Option<TargetRepo>,
}

impl GenerationJob {
    /// Check the analysis and target repositories up front.
    pub fn prepare(
        repos_dir: &Path,
        config: &Configuration,
        record: &AnalysisRecord,
        target: GenerationTarget,
    ) -> Result<Self> {
        let plan = match (&record.plan, record.status) {
            (Some(plan), AnalysisStatus::Completed) => plan.clone(),
            _ => anyhow::bail!("Analysis {} has no migration plan", record.id),
        };
        let stem = screen_stem(&record.file_name)?.to_string();

        let frontend = target
            .frontend()
            .then(|| TargetRepo::resolve(repos_dir, config.frontend_repo.as_ref(), "frontend"))
            .transpose()?;
        let backend = target
            .backend()
            .then(|| TargetRepo::resolve(repos_dir, config.backend_repo.as_ref(), "backend"))
            .transpose()?;

        Ok(Self {
            analysis_id: record.id,
            file_name: record.file_name.clone(),
            stem,
            plan,
            target,
            frontend,
            backend,
        })
    }

    pub fn branch_name(&self) -> String {
        format!("feature/{}", self.stem.to_lowercase())
    }

    fn commit_message(&self) -> String {
        format!("feat: generate {} from {}", component_name(&self.stem), self.file_name)
    }

    fn documentation_query(&self) -> String {
        let component_type = self.plan.frontend.component_type.trim();
        format!("NSDK screen {} {}", self.stem, component_type).trim().to_string()
    }

    /// Documentation snippets for the prompts. Failures only cost context.
    async fn documentation(&self, state: &AppState, config: &Configuration) -> String {
        let query = self.documentation_query();
        match docs::query_documentation(
            state,
            config,
            &query,
            docs::DEFAULT_QUERY_LIMIT,
            docs::DEFAULT_QUERY_THRESHOLD,
        )
        .await
        {
            Ok(snippets) => {
                tracing::debug!("{} documentation snippets for {}", snippets.len(), self.file_name);
                docs::format_snippets(&snippets)
            }
            Err(e) => {
                tracing::warn!("Documentation lookup failed for {}: {e:#}", self.file_name);
                String::new()
            }
        }
    }

    pub async fn run(self, state: &AppState, config: &Configuration, push: bool) -> Result<GenerationResult> {
        let component = component_name(&self.stem);
        let class = class_name(&self.stem);
        let llm = state.llm(config);
        let java_package = state.config.java_package.as_str();
        tracing::info!("Generating code for {} ({:?})", self.file_name, self.target);
        let documentation = self.documentation(state, config).await;

        let frontend = match &self.frontend {
            Some(repo) => {
                let messages = frontend_messages(&self.plan, &self.file_name, &component, &class, &documentation)?;
                let reply = llm.chat(&messages).await.context("Frontend generation request failed")?;
                let files = frontend_files(&reply, &component)?;
                Some(self.commit(&state.git, repo, files, push).await?)
            }
            None => None,
        };

        let backend = match &self.backend {
            Some(repo) => {
                let table = match self.plan.backend.database_table.trim() {
                    "" => self.stem.to_uppercase(),
                    table => table.to_string(),
                };
                let messages = backend_messages(&self.plan, &self.file_name, &class, &table, &documentation)?;
                let reply = llm.chat(&messages).await.context("Backend generation request failed")?;
                let files = backend_files(&reply, &class, java_package)?;
                Some(self.commit(&state.git, repo, files, push).await?)
            }
            None => None,
        };

        Ok(GenerationResult {
            analysis_id: self.analysis_id,
            file_name: self.file_name,
            target: self.target,
            frontend,
            backend,
        })
    }

    async fn commit(
        &self,
        gate: &GitGate,
        repo: &TargetRepo,
        files: Vec<(String, String)>,
        push: bool,
    ) -> Result<RepoGeneration> {
        if files.is_empty() {
            anyhow::bail!("LLM returned no usable files for {}", repo.name);
        }
        let files_generated = files.len();
        let dir = repo.dir.clone();
        let creds = repo.creds.clone();
        let branch = self.branch_name();
        let message = self.commit_message();

        let repo_guard = gate.lock_repo(&dir).await;
        let outcome = tokio::task::spawn_blocking(move || {
            let _held = repo_guard;
            create_branch_and_commit(&dir, &branch, &files, &message, push, creds.as_ref())
        })
        .await
        .context("Git task panicked")??;

        tracing::info!(
            "Generated {} files on {} in {}",
            files_generated,
            outcome.branch,
            repo.name
        );
        Ok(RepoGeneration {
            repository: repo.name.clone(),
            files_generated,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{record_from_reply, ScreenSource};
    use crate::models::{ConfigurationRequest, LlmSettings, VectorStoreSettings};

    fn repo(url: &str) -> RepositoryConfig {
        RepositoryConfig {
            url: url.to_string(),
            branch: "main".to_string(),
            username: None,
            token: None,
        }
    }

    fn configuration() -> Configuration {
        Configuration::new(ConfigurationRequest {
            name: "c".to_string(),
            source_repo: repo("https://git.example.com/acme/legacy.git"),
            frontend_repo: Some(repo("https://git.example.com/acme/web.git")),
            backend_repo: Some(repo("https://git.example.com/acme/api.git")),
            llm: LlmSettings::default(),
            vector_store: VectorStoreSettings::default(),
        })
    }

    fn record(file_name: &str, reply: &str) -> AnalysisRecord {
        let source = ScreenSource {
            repo_name: None,
            file_path: file_name.to_string(),
            file_name: file_name.to_string(),
            content: String::new(),
        };
        record_from_reply(None, &source, reply)
    }

    #[test]
    fn test_names() {
        assert_eq!(screen_stem("CLIENT_EDIT.SCR").unwrap(), "CLIENT_EDIT");
        assert_eq!(screen_stem("client.scr").unwrap(), "client");
        assert!(screen_stem("client.ncl").is_err());
        assert!(screen_stem(".scr").is_err());
        assert_eq!(component_name("CLIENT_EDIT"), "client-edit");
        assert_eq!(class_name("CLIENT_EDIT"), "ClientEdit");
        assert_eq!(class_name("order__line"), "OrderLine");
    }

    #[test]
    fn test_frontend_mapping() {
        let reply = r#"{"component_ts": "ts", "component_html": "html", "model_ts": "m",
                        "readme": "x", "service_ts": 3}"#;
        let files = frontend_files(reply, "client-edit").unwrap();
        let paths: Vec<_> = files.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "src/app/features/client-edit/client-edit.component.html",
                "src/app/features/client-edit/client-edit.component.ts",
                "src/app/models/client-edit.model.ts",
            ]
        );
    }

    #[test]
    fn test_backend_mapping() {
        let reply = "```json\n{\"entity_java\": \"class A {}\", \"request_dto_java\": \"r\", \"controller_java\": \"c\"}\n```";
        let files = backend_files(reply, "ClientEdit", "com.acme.app").unwrap();
        let paths: Vec<_> = files.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "src/main/java/com/acme/app/controller/ClientEditController.java",
                "src/main/java/com/acme/app/dto/ClientEditRequestDTO.java",
                "src/main/java/com/acme/app/entity/ClientEdit.java",
            ]
        );
        assert!(backend_files("no json here", "X", "p").is_err());
    }

    #[test]
    fn test_prepare_requires_plan_and_screen() {
        let repos = tempfile::tempdir().unwrap();
        let config = configuration();

        let failed = record("CLIENT.SCR", "not json");
        assert!(GenerationJob::prepare(repos.path(), &config, &failed, GenerationTarget::Both).is_err());

        let module = record("UTIL.NCL", r#"{"file_type": "module"}"#);
        assert!(GenerationJob::prepare(repos.path(), &config, &module, GenerationTarget::Both).is_err());
    }

    #[test]
    fn test_prepare_requires_cloned_targets() {
        let repos = tempfile::tempdir().unwrap();
        let mut config = configuration();
        let rec = record("CLIENT_EDIT.SCR", r#"{"file_type": "screen"}"#);

        let err = GenerationJob::prepare(repos.path(), &config, &rec, GenerationTarget::Frontend).unwrap_err();
        assert!(err.to_string().contains("has not been cloned"));

        std::fs::create_dir_all(repos.path().join("web/.git")).unwrap();
        let job = GenerationJob::prepare(repos.path(), &config, &rec, GenerationTarget::Frontend).unwrap();
        assert_eq!(job.branch_name(), "feature/client_edit");
        assert_eq!(job.commit_message(), "feat: generate client-edit from CLIENT_EDIT.SCR");
        assert!(job.backend.is_none());

        // backend not cloned
        assert!(GenerationJob::prepare(repos.path(), &config, &rec, GenerationTarget::Both).is_err());

        config.backend_repo = None;
        let err = GenerationJob::prepare(repos.path(), &config, &rec, GenerationTarget::Backend).unwrap_err();
        assert!(err.to_string().contains("No backend repository"));
    }

    #[test]
    fn test_prompts_carry_plan_and_names() {
        let plan = MigrationPlan {
            analysis_summary: "edit a client".to_string(),
            ..MigrationPlan::default()
        };
        let fe = frontend_messages(&plan, "CLIENT_EDIT.SCR", "client-edit", "ClientEdit", "").unwrap();
        assert!(fe[1].content.contains("edit a client"));
        assert!(fe[1].content.contains("`client-edit`"));
        assert!(fe[1].content.contains("\"model_ts\""));
        assert!(!fe[1].content.contains("## NSDK documentation"));

        let be = backend_messages(&plan, "CLIENT_EDIT.SCR", "ClientEdit", "T_CLIENT", "  ").unwrap();
        assert!(be[1].content.contains("table `T_CLIENT`"));
        assert!(be[1].content.contains("\"response_dto_java\""));
        assert!(!be[1].content.contains("## NSDK documentation"));
    }

    #[test]
    fn test_prompts_include_documentation_before_requirements() {
        let plan = MigrationPlan::default();
        let snippets = "Source 1 (BUTTONS):\nButtons trigger functions.";
        for messages in [
            frontend_messages(&plan, "CLIENT.SCR", "client", "Client", snippets).unwrap(),
            backend_messages(&plan, "CLIENT.SCR", "Client", "CLIENT", snippets).unwrap(),
        ] {
            let prompt = &messages[1].content;
            let section = prompt.find("## NSDK documentation\nSource 1 (BUTTONS)").unwrap();
            assert!(section < prompt.find("## Requirements").unwrap());
        }
    }

    #[test]
    fn test_documentation_query_uses_screen_and_type() {
        let repos = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(repos.path().join("web/.git")).unwrap();
        let rec = record("CLIENT_EDIT.SCR", r#"{"frontend": {"component_type": "form"}}"#);
        let job = GenerationJob::prepare(repos.path(), &configuration(), &rec, GenerationTarget::Frontend).unwrap();
        assert_eq!(job.documentation_query(), "NSDK screen CLIENT_EDIT form");
    }
}
