//! End-to-end tests: local git fixtures served over `file://` and a fake
//! Ollama server, so no network or real model is needed.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nsdk_migrator::analysis::{self, AnalysisStatus, ScreenSource};
use nsdk_migrator::codegen::{GenerationJob, GenerationTarget};
use nsdk_migrator::config::Config;
use nsdk_migrator::db::Database;
use nsdk_migrator::docs::{self, DocumentStatus};
use nsdk_migrator::models::{
    AnalyzeRequest, Configuration, ConfigurationRequest, LlmProvider, LlmSettings,
    RepositoryConfig, SearchRequest, VectorStoreSettings, VectorizeRequest,
};
use nsdk_migrator::state::AppState;
use nsdk_migrator::vectorize::{self, BatchKind, BatchStatus, VectorizationBatch};

const SCREEN: &str = "\
SCREEN client_edit
  FIELD cust_name CHAR
  FIELD cust_age NUMERIC
  BUTTON save
  VALIDATE cust_age > 0
END SCREEN
";

const MODULE: &str = "\
MODULE util
FUNCTION load_client
  SELECT name FROM clients WHERE id = :id
END FUNCTION
";

const PLAN_REPLY: &str = "```json\n{\"analysis_summary\": \"Edit a client\", \"complexity\": \"low\", \
\"estimated_hours\": \"6\", \"frontend\": {\"component_type\": \"form\"}, \
\"backend\": {\"entity_name\": \"ClientEdit\", \"database_table\": \"T_CLIENT\"}}\n```";

const FRONTEND_REPLY: &str = r#"{"component_ts": "export class ClientEditComponent {}",
"component_html": "<form></form>", "model_ts": "export interface ClientEdit {}"}"#;

const BACKEND_REPLY: &str = r#"{"entity_java": "public class ClientEdit {}",
"controller_java": "public class ClientEditController {}"}"#;

// ─── Fixtures ────────────────────────────────────────────

fn init_repo(dir: &Path, files: &[(&str, &str)]) -> String {
    let mut opts = git2::RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = git2::Repository::init_opts(dir, &opts).unwrap();
    for (rel, content) in files {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = git2::Signature::now("Fixture", "fixture@example.com").unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();
    format!("file://{}", dir.display())
}

/// Four features so cosine similarity is meaningful.
fn fake_embedding(text: &str) -> Vec<f32> {
    let upper = text.to_uppercase();
    vec![
        1.0 + upper.matches("SCREEN").count() as f32,
        1.0 + upper.matches("FIELD").count() as f32,
        1.0 + upper.matches("FUNCTION").count() as f32,
        1.0,
    ]
}

async fn fake_embed(Json(body): Json<Value>) -> Json<Value> {
    let text = body["input"][0].as_str().unwrap_or_default();
    Json(json!({ "embeddings": [fake_embedding(text)] }))
}

fn last_prompt(body: &Value) -> &str {
    body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
}

async fn fake_chat(Json(body): Json<Value>) -> Json<Value> {
    let prompt = last_prompt(&body);
    let content = if prompt.contains("\"component_ts\"") {
        FRONTEND_REPLY
    } else if prompt.contains("\"entity_java\"") {
        BACKEND_REPLY
    } else {
        PLAN_REPLY
    };
    Json(json!({ "message": { "role": "assistant", "content": content } }))
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn fake_ollama() -> String {
    serve(
        Router::new()
            .route("/api/embed", post(fake_embed))
            .route("/api/chat", post(fake_chat)),
    )
    .await
}

type Prompts = Arc<Mutex<Vec<String>>>;

/// Like [`fake_ollama`], keeping every chat prompt it receives.
async fn recording_ollama() -> (String, Prompts) {
    let prompts = Prompts::default();
    let app = Router::new()
        .route("/api/embed", post(fake_embed))
        .route(
            "/api/chat",
            post(|State(prompts): State<Prompts>, Json(body): Json<Value>| async move {
                prompts.lock().unwrap().push(last_prompt(&body).to_string());
                fake_chat(Json(body)).await
            }),
        )
        .with_state(prompts.clone());
    (serve(app).await, prompts)
}

fn repo_config(url: &str) -> RepositoryConfig {
    RepositoryConfig {
        url: url.to_string(),
        branch: "main".to_string(),
        username: None,
        token: None,
    }
}

fn configuration(llm_url: &str, source_url: &str) -> Configuration {
    Configuration::new(ConfigurationRequest {
        name: "fixture".to_string(),
        source_repo: repo_config(source_url),
        frontend_repo: None,
        backend_repo: None,
        llm: LlmSettings {
            provider: LlmProvider::Ollama,
            base_url: Some(llm_url.to_string()),
            ..LlmSettings::default()
        },
        vector_store: VectorStoreSettings {
            dimension: 4,
            similarity_threshold: 0.0,
            ..VectorStoreSettings::default()
        },
    })
}

fn app_state(data_dir: &Path) -> AppState {
    let config = Config {
        data_dir: data_dir.to_path_buf(),
        java_package: "com.acme.app".to_string(),
        ..Config::default()
    };
    std::fs::create_dir_all(config.repos_dir()).unwrap();
    AppState::with_database(config, Database::in_memory().unwrap()).unwrap()
}

async fn wait_for_batch(state: &AppState, id: uuid::Uuid) -> VectorizationBatch {
    for _ in 0..400 {
        let batch = state.batches.get(id).unwrap();
        if batch.status.is_terminal() {
            return batch;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("batch {id} did not finish");
}

// ─── Pipeline ────────────────────────────────────────────

#[tokio::test]
async fn test_vectorize_search_analyze_generate() {
    let work = tempfile::tempdir().unwrap();
    let source_url = init_repo(
        &work.path().join("legacy-app"),
        &[
            ("screens/CLIENT_EDIT.SCR", SCREEN),
            ("lib/UTIL.NCL", MODULE),
            ("README.md", "legacy app"),
        ],
    );
    let web_url = init_repo(&work.path().join("web-app"), &[("README.md", "web")]);
    let api_url = init_repo(&work.path().join("api-app"), &[("README.md", "api")]);

    let data = tempfile::tempdir().unwrap();
    let state = app_state(data.path());
    let mut config = configuration(&fake_ollama().await, &source_url);

    // Vectorize the legacy repository
    let batch = vectorize::start(&state, &config, VectorizeRequest::default(), BatchKind::Repository).unwrap();
    assert_eq!(batch.status, BatchStatus::Pending);
    let batch = wait_for_batch(&state, batch.id).await;
    assert_eq!(batch.status, BatchStatus::Completed, "{:?}", batch.error_message);
    assert_eq!(batch.total_files, 2);
    assert_eq!(batch.successful_files, 2);
    assert_eq!(batch.view().progress_percentage, 100.0);

    let stats = vectorize::stats(&state, Some(&config)).await;
    assert_eq!(stats.vector_store.unwrap().vector_count, 2);
    assert_eq!(stats.batches.files_vectorized, 2);

    // Re-running replaces vectors instead of duplicating them
    let again = vectorize::start(&state, &config, VectorizeRequest::default(), BatchKind::Repository).unwrap();
    assert_eq!(wait_for_batch(&state, again.id).await.status, BatchStatus::Completed);
    let stats = vectorize::stats(&state, Some(&config)).await;
    assert_eq!(stats.vector_store.unwrap().vector_count, 2);

    // Similarity search
    let response = vectorize::search_similar(
        &state,
        &config,
        SearchRequest {
            query: "SCREEN with FIELD".to_string(),
            limit: 1,
            threshold: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].payload.technology, "nsdk");
    assert_eq!(response.results[0].payload.repo, "legacy-app");

    // Analyze the screen from the cloned repository
    let source = ScreenSource::resolve(
        &state.config.repos_dir(),
        AnalyzeRequest {
            repo_name: Some("legacy-app".to_string()),
            file_path: Some("screens/CLIENT_EDIT.SCR".to_string()),
            file_name: None,
            content: None,
        },
    )
    .unwrap();
    let record = analysis::analyze(&state, &config, source).await.unwrap();
    assert_eq!(record.status, AnalysisStatus::Completed);
    let plan = record.plan.clone().unwrap();
    assert_eq!(plan.estimated_hours, 6.0);
    assert_eq!(plan.backend.database_table, "T_CLIENT");
    assert!(state.db.lock().get_analysis(record.id).unwrap().is_some());

    // Generate code onto both target repositories
    config.frontend_repo = Some(repo_config(&web_url));
    config.backend_repo = Some(repo_config(&api_url));
    for url in [&web_url, &api_url] {
        let name = nsdk_migrator::models::repo_name_from_url(url);
        nsdk_migrator::git::sync_repository(
            &state.git,
            Duration::from_secs(30),
            url.to_string(),
            state.config.repos_dir().join(name),
            "main".to_string(),
            None,
        )
        .await
        .unwrap();
    }

    let job = GenerationJob::prepare(&state.config.repos_dir(), &config, &record, GenerationTarget::Both).unwrap();
    let result = job
        .run(&state, &config, false)
        .await
        .unwrap();

    let frontend = result.frontend.unwrap();
    assert_eq!(frontend.outcome.branch, "feature/client_edit");
    assert_eq!(frontend.files_generated, 3);
    assert!(frontend.outcome.commit_sha.is_some());
    assert!(state
        .config
        .repos_dir()
        .join("web-app/src/app/features/client-edit/client-edit.component.ts")
        .exists());

    let backend = result.backend.unwrap();
    assert_eq!(backend.files_generated, 2);
    let controller = state
        .config
        .repos_dir()
        .join("api-app/src/main/java/com/acme/app/controller/ClientEditController.java");
    assert_eq!(
        std::fs::read_to_string(controller).unwrap(),
        "public class ClientEditController {}"
    );

    let api_repo = git2::Repository::open(state.config.repos_dir().join("api-app")).unwrap();
    let head = api_repo.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(
        head.message(),
        Some("feat: generate client-edit from CLIENT_EDIT.SCR")
    );
}

const MANUAL: &str = "NSDK Reference Guide\n\n\
1. SCREEN CONTROLS\nA SCREEN groups FIELD controls.\n\n\
2. FUNCTIONS\nA FUNCTION runs SQL.\n";

#[tokio::test]
async fn test_documentation_feeds_generation_prompts() {
    let work = tempfile::tempdir().unwrap();
    let source_url = init_repo(&work.path().join("legacy-app"), &[("screens/CLIENT_EDIT.SCR", SCREEN)]);
    let web_url = init_repo(&work.path().join("web-app"), &[("README.md", "web")]);

    let data = tempfile::tempdir().unwrap();
    let state = app_state(data.path());
    let (llm_url, prompts) = recording_ollama().await;
    let mut config = configuration(&llm_url, &source_url);

    let first = docs::ingest(&state, &config, "nsdk-guide", MANUAL).await.unwrap();
    assert!(!first.reused);
    assert_eq!(first.document.status, DocumentStatus::Completed);
    assert_eq!(first.document.total_chunks, 2);

    // a completed document is not processed twice
    let again = docs::ingest(&state, &config, "nsdk-guide", MANUAL).await.unwrap();
    assert!(again.reused);
    assert_eq!(again.document.id, first.document.id);
    assert_eq!(state.db.lock().list_documents().unwrap().len(), 1);

    // documentation lives beside the code vectors, not in them
    let stats = vectorize::stats(&state, Some(&config)).await;
    assert_eq!(stats.vector_store.unwrap().vector_count, 0);

    let snippets = docs::query_documentation(
        &state,
        &config,
        "screen field",
        docs::DEFAULT_QUERY_LIMIT,
        docs::DEFAULT_QUERY_THRESHOLD,
    )
    .await
    .unwrap();
    let titles: Vec<_> = snippets.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["SCREEN CONTROLS", "FUNCTIONS"]);
    assert_eq!(snippets[0].document, "nsdk-guide");

    config.frontend_repo = Some(repo_config(&web_url));
    nsdk_migrator::git::sync_repository(
        &state.git,
        Duration::from_secs(30),
        web_url.clone(),
        state.config.repos_dir().join("web-app"),
        "main".to_string(),
        None,
    )
    .await
    .unwrap();

    let source = ScreenSource {
        repo_name: Some("legacy-app".to_string()),
        file_path: "screens/CLIENT_EDIT.SCR".to_string(),
        file_name: "CLIENT_EDIT.SCR".to_string(),
        content: SCREEN.to_string(),
    };
    let record = analysis::record_from_reply(Some(config.id), &source, PLAN_REPLY);
    let job = GenerationJob::prepare(&state.config.repos_dir(), &config, &record, GenerationTarget::Frontend).unwrap();
    let result = job.run(&state, &config, false).await.unwrap();
    assert_eq!(result.frontend.unwrap().files_generated, 3);

    let prompts = prompts.lock().unwrap();
    let frontend_prompt = prompts
        .iter()
        .find(|p| p.contains("\"component_ts\""))
        .unwrap();
    assert!(frontend_prompt.contains("## NSDK documentation\nSource 1 (SCREEN CONTROLS):\nA SCREEN groups FIELD controls."));
}

#[tokio::test]
async fn test_failed_document_can_be_ingested_again() {
    let data = tempfile::tempdir().unwrap();
    let state = app_state(data.path());
    // nothing listens on port 9 so embedding fails
    let mut config = configuration("http://127.0.0.1:9", "file:///nowhere");

    let err = docs::ingest(&state, &config, "nsdk-guide", MANUAL).await.unwrap_err();
    assert!(format!("{err:#}").contains("embed"));
    let failed = state.db.lock().get_document_by_name("nsdk-guide").unwrap().unwrap();
    assert_eq!(failed.status, DocumentStatus::Failed);
    assert!(failed.error.is_some());

    config.llm.base_url = Some(fake_ollama().await);
    let retried = docs::ingest(&state, &config, "nsdk-guide", MANUAL).await.unwrap();
    assert!(!retried.reused);
    assert_ne!(retried.document.id, failed.id);
    assert_eq!(retried.document.status, DocumentStatus::Completed);
    assert_eq!(state.db.lock().list_documents().unwrap().len(), 1);
}

#[tokio::test]
async fn test_back_to_back_batches_on_one_repository() {
    let work = tempfile::tempdir().unwrap();
    let source_url = init_repo(
        &work.path().join("legacy-app"),
        &[("screens/CLIENT_EDIT.SCR", SCREEN), ("lib/UTIL.NCL", MODULE)],
    );
    let data = tempfile::tempdir().unwrap();
    let state = app_state(data.path());
    let config = configuration(&fake_ollama().await, &source_url);

    for round in 0..3 {
        let first = vectorize::start(&state, &config, VectorizeRequest::default(), BatchKind::Repository).unwrap();
        let second = vectorize::start(&state, &config, VectorizeRequest::default(), BatchKind::Repository).unwrap();
        for id in [first.id, second.id] {
            let batch = wait_for_batch(&state, id).await;
            assert_eq!(
                batch.status,
                BatchStatus::Completed,
                "round {round}: {:?}",
                batch.error_message
            );
            assert_eq!(batch.successful_files, 2);
        }
    }
    // Same records are replaced, not duplicated
    let stats = vectorize::stats(&state, Some(&config)).await;
    assert_eq!(stats.vector_store.unwrap().vector_count, 2);
}

#[tokio::test]
async fn test_module_batch_only_scans_module() {
    let work = tempfile::tempdir().unwrap();
    let source_url = init_repo(
        &work.path().join("legacy-app"),
        &[("screens/CLIENT_EDIT.SCR", SCREEN), ("lib/UTIL.NCL", MODULE)],
    );
    let data = tempfile::tempdir().unwrap();
    let state = app_state(data.path());
    let config = configuration(&fake_ollama().await, &source_url);

    let req = VectorizeRequest {
        module_path: Some("lib".to_string()),
        ..VectorizeRequest::default()
    };
    let batch = vectorize::start(&state, &config, req, BatchKind::Module).unwrap();
    let batch = wait_for_batch(&state, batch.id).await;
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.file_ids, vec!["lib/UTIL.NCL"]);

    assert!(vectorize::start(&state, &config, VectorizeRequest::default(), BatchKind::Module).is_err());
}

#[tokio::test]
async fn test_unknown_technology_fails_batch() {
    let work = tempfile::tempdir().unwrap();
    let source_url = init_repo(&work.path().join("docs"), &[("README.md", "just docs")]);
    let data = tempfile::tempdir().unwrap();
    let state = app_state(data.path());
    let config = configuration(&fake_ollama().await, &source_url);

    let batch = vectorize::start(&state, &config, VectorizeRequest::default(), BatchKind::Repository).unwrap();
    let batch = wait_for_batch(&state, batch.id).await;
    assert_eq!(batch.status, BatchStatus::Failed);
    assert!(batch
        .error_message
        .unwrap()
        .contains("Could not detect a supported technology"));
}

#[tokio::test]
async fn test_embedding_failures_fail_batch_with_counts() {
    let work = tempfile::tempdir().unwrap();
    let source_url = init_repo(
        &work.path().join("legacy-app"),
        &[("screens/CLIENT_EDIT.SCR", SCREEN), ("lib/UTIL.NCL", MODULE)],
    );
    let data = tempfile::tempdir().unwrap();
    let state = app_state(data.path());
    // Configured for 8 dimensions, the fake model returns 4
    let mut config = configuration(&fake_ollama().await, &source_url);
    config.vector_store.dimension = 8;

    let batch = vectorize::start(&state, &config, VectorizeRequest::default(), BatchKind::Repository).unwrap();
    let batch = wait_for_batch(&state, batch.id).await;
    assert_eq!(batch.status, BatchStatus::Failed);
    assert_eq!(batch.failed_files, 2);
    assert_eq!(batch.error_files.len(), 2);
    assert_eq!(batch.error_message.as_deref(), Some("2 of 2 files failed"));
}

// ─── HTTP API ────────────────────────────────────────────

#[tokio::test]
async fn test_http_api_configuration_flow() {
    let data = tempfile::tempdir().unwrap();
    let state = app_state(data.path());
    let base = serve(nsdk_migrator::api::router(state)).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    // Nothing works without an active configuration
    let resp = client
        .post(format!("{base}/api/vectorize"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Invalid: OpenAI without a key
    let resp = client
        .post(format!("{base}/api/configurations"))
        .json(&json!({
            "name": "bad",
            "source_repo": {"url": "https://git.example.com/acme/legacy.git"},
            "llm": {"provider": "openai"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/api/configurations"))
        .json(&json!({
            "name": "legacy",
            "source_repo": {
                "url": "https://git.example.com/acme/legacy.git",
                "username": "bot",
                "token": "s3cret"
            },
            "llm": {"provider": "ollama", "base_url": "http://localhost:11434"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body = resp.text().await.unwrap();
    assert!(!body.contains("s3cret"));
    let created: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(created["source_repo"]["has_token"], true);
    assert_eq!(created["is_active"], false);
    let id = created["id"].as_str().unwrap().to_string();

    let resp = client
        .get(format!("{base}/api/configurations/active"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{base}/api/configurations/{id}/activate"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let active: Value = client
        .get(format!("{base}/api/configurations/active"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(active["id"], id.as_str());
    assert_eq!(active["is_active"], true);

    // Update without a token keeps the stored one
    let resp = client
        .put(format!("{base}/api/configurations/{id}"))
        .json(&json!({
            "name": "renamed",
            "source_repo": {"url": "https://git.example.com/acme/legacy.git", "username": "bot"},
            "llm": {"provider": "ollama", "base_url": "http://localhost:11434"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["name"], "renamed");
    assert_eq!(updated["source_repo"]["has_token"], true);

    let unknown = uuid::Uuid::new_v4();
    let resp = client
        .get(format!("{base}/api/vectorize/batches/{unknown}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let resp = client
        .get(format!("{base}/api/analysis/{unknown}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let resp = client
        .post(format!("{base}/api/vectorize/module"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .delete(format!("{base}/api/configurations/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    let resp = client
        .get(format!("{base}/api/configurations/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_http_api_repositories_and_batches() {
    let work = tempfile::tempdir().unwrap();
    let source_url = init_repo(
        &work.path().join("legacy-app"),
        &[("screens/CLIENT_EDIT.SCR", SCREEN), ("lib/UTIL.NCL", MODULE)],
    );
    let data = tempfile::tempdir().unwrap();
    let state = app_state(data.path());
    let config = configuration(&fake_ollama().await, &source_url);
    {
        let db = state.db.lock();
        db.insert_configuration(&config).unwrap();
        db.activate_configuration(config.id).unwrap();
    }
    let base = serve(nsdk_migrator::api::router(state.clone())).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/repositories"))
        .json(&json!({"url": source_url, "branch": "main"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let synced: Value = resp.json().await.unwrap();
    assert_eq!(synced["action"], "cloned");
    assert_eq!(synced["repository"]["name"], "legacy-app");

    let screens: Value = client
        .get(format!("{base}/api/repositories/legacy-app/screens"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(screens[0]["name"], "client_edit");

    let tech: Value = client
        .get(format!("{base}/api/repositories/legacy-app/technology"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tech["technology"], "nsdk");

    let resp = client
        .post(format!("{base}/api/repositories/legacy-app/update"))
        .json(&json!({"branch": "main"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["action"], "updated");

    let resp = client
        .get(format!("{base}/api/repositories/missing/tree"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("{base}/api/vectorize"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let batch: Value = resp.json().await.unwrap();
    let batch_id: uuid::Uuid = batch["id"].as_str().unwrap().parse().unwrap();
    let finished = wait_for_batch(&state, batch_id).await;
    assert_eq!(finished.status, BatchStatus::Completed);

    // Finished batches cannot be cancelled
    let resp = client
        .post(format!("{base}/api/vectorize/batches/{batch_id}/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let results: Value = client
        .post(format!("{base}/api/vectorize/search"))
        .json(&json!({"query": "FUNCTION load_client", "limit": 5}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(results["results"].as_array().unwrap().len(), 2);

    let resp = client
        .delete(format!("{base}/api/vectorize/collection"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    let stats: Value = client
        .get(format!("{base}/api/vectorize/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["vector_store"]["vector_count"], 0);
    assert_eq!(stats["batches"]["completed"], 1);

    let resp = client
        .delete(format!("{base}/api/repositories/legacy-app"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);
    let repos: Value = client
        .get(format!("{base}/api/repositories"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(repos.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_http_api_documentation() {
    let data = tempfile::tempdir().unwrap();
    let state = app_state(data.path());
    let config = configuration(&fake_ollama().await, "file:///nowhere");
    {
        let db = state.db.lock();
        db.insert_configuration(&config).unwrap();
        db.activate_configuration(config.id).unwrap();
    }
    let base = serve(nsdk_migrator::api::router(state)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/vectorize/docs"))
        .json(&json!({"name": "nsdk-guide", "content": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/api/vectorize/docs"))
        .json(&json!({"name": "nsdk-guide", "content": MANUAL}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["status"], "completed");
    assert_eq!(created["total_chunks"], 2);

    let resp = client
        .post(format!("{base}/api/vectorize/docs"))
        .json(&json!({"name": "nsdk-guide", "content": MANUAL}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let reused: Value = resp.json().await.unwrap();
    assert_eq!(reused["id"], created["id"]);

    let listed: Value = client
        .get(format!("{base}/api/docs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let answer: Value = client
        .post(format!("{base}/api/docs/query"))
        .json(&json!({"query": "FUNCTION calls", "limit": 1}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(answer["snippets"].as_array().unwrap().len(), 1);
    assert_eq!(answer["snippets"][0]["title"], "FUNCTIONS");
    assert!(answer["context"]
        .as_str()
        .unwrap()
        .starts_with("Source 1 (FUNCTIONS):\nA FUNCTION runs SQL."));

    let resp = client
        .post(format!("{base}/api/docs/query"))
        .json(&json!({"query": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
