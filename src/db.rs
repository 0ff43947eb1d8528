use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

use crate::analysis::{AnalysisRecord, AnalysisStatus};
use crate::docs::{DocumentRecord, DocumentStatus};
use crate::models::Configuration;

/// SQLite store for configurations, analysis results and ingested
/// documents. Nested settings are kept as JSON text.
pub struct Database {
    conn: Connection,
}

const CONFIG_COLUMNS: &str = "id, name, source_repo, frontend_repo, backend_repo, llm, \
                              vector_store, is_active, created_at, updated_at";

const ANALYSIS_COLUMNS: &str = "id, configuration_id, repo_name, file_path, file_name, \
                                status, plan, raw_response, error, created_at";

const DOCUMENT_COLUMNS: &str = "id, name, status, total_chunks, char_count, error, \
                                created_at, updated_at";

impl Database {
    /// Open or create a SQLite database at the given path.
    /// Uses WAL mode for concurrent read performance.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        self.conn.execute_batch("PRAGMA busy_timeout=5000;")?;

        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS configurations (
                id            TEXT PRIMARY KEY,
                name          TEXT NOT NULL,
                source_repo   TEXT NOT NULL,
                frontend_repo TEXT,
                backend_repo  TEXT,
                llm           TEXT NOT NULL,
                vector_store  TEXT NOT NULL,
                is_active     INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS analyses (
                id               TEXT PRIMARY KEY,
                configuration_id TEXT,
                repo_name        TEXT,
                file_path        TEXT NOT NULL,
                file_name        TEXT NOT NULL,
                status           TEXT NOT NULL,
                plan             TEXT,
                raw_response     TEXT NOT NULL DEFAULT '',
                error            TEXT,
                created_at       TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_analyses_file
                ON analyses(file_name);

            CREATE TABLE IF NOT EXISTS documents (
                id           TEXT PRIMARY KEY,
                name         TEXT NOT NULL UNIQUE,
                status       TEXT NOT NULL,
                total_chunks INTEGER NOT NULL DEFAULT 0,
                char_count   INTEGER NOT NULL DEFAULT 0,
                error        TEXT,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    // ─── Configurations ──────────────────────────────────

    pub fn insert_configuration(&self, config: &Configuration) -> Result<()> {
        self.conn.execute(
            &format!("INSERT INTO configurations ({CONFIG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            params![
                config.id.to_string(),
                config.name,
                serde_json::to_string(&config.source_repo)?,
                config.frontend_repo.as_ref().map(serde_json::to_string).transpose()?,
                config.backend_repo.as_ref().map(serde_json::to_string).transpose()?,
                serde_json::to_string(&config.llm)?,
                serde_json::to_string(&config.vector_store)?,
                config.is_active,
                config.created_at.to_rfc3339(),
                config.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Returns false when no configuration has this id.
    pub fn update_configuration(&self, config: &Configuration) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE configurations SET name = ?2, source_repo = ?3, frontend_repo = ?4,
                 backend_repo = ?5, llm = ?6, vector_store = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                config.id.to_string(),
                config.name,
                serde_json::to_string(&config.source_repo)?,
                config.frontend_repo.as_ref().map(serde_json::to_string).transpose()?,
                config.backend_repo.as_ref().map(serde_json::to_string).transpose()?,
                serde_json::to_string(&config.llm)?,
                serde_json::to_string(&config.vector_store)?,
                config.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn get_configuration(&self, id: Uuid) -> Result<Option<Configuration>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {CONFIG_COLUMNS} FROM configurations WHERE id = ?1"),
                params![id.to_string()],
                ConfigRow::from_row,
            )
            .optional()?;
        raw.map(ConfigRow::into_configuration).transpose()
    }

    /// Newest first.
    pub fn list_configurations(&self) -> Result<Vec<Configuration>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONFIG_COLUMNS} FROM configurations ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], ConfigRow::from_row)?;
        let mut configs = Vec::new();
        for row in rows {
            configs.push(row?.into_configuration()?);
        }
        Ok(configs)
    }

    pub fn active_configuration(&self) -> Result<Option<Configuration>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {CONFIG_COLUMNS} FROM configurations WHERE is_active = 1 LIMIT 1"),
                [],
                ConfigRow::from_row,
            )
            .optional()?;
        raw.map(ConfigRow::into_configuration).transpose()
    }

    /// Make `id` the only active configuration. Returns false for an unknown id
    /// (and leaves the previous active configuration untouched).
    pub fn activate_configuration(&self, id: Uuid) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM configurations WHERE id = ?1",
                params![id.to_string()],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Ok(false);
        }
        let now = Utc::now().to_rfc3339();
        tx.execute("UPDATE configurations SET is_active = 0 WHERE is_active = 1", [])?;
        tx.execute(
            "UPDATE configurations SET is_active = 1, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), now],
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn delete_configuration(&self, id: Uuid) -> Result<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM configurations WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    // ─── Analyses ────────────────────────────────────────

    pub fn insert_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        self.conn.execute(
            &format!("INSERT INTO analyses ({ANALYSIS_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            params![
                record.id.to_string(),
                record.configuration_id.map(|id| id.to_string()),
                record.repo_name,
                record.file_path,
                record.file_name,
                record.status.as_str(),
                record.plan.as_ref().map(serde_json::to_string).transpose()?,
                record.raw_response,
                record.error,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_analysis(&self, id: Uuid) -> Result<Option<AnalysisRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {ANALYSIS_COLUMNS} FROM analyses WHERE id = ?1"),
                params![id.to_string()],
                AnalysisRow::from_row,
            )
            .optional()?;
        raw.map(AnalysisRow::into_record).transpose()
    }

    /// Newest first.
    pub fn list_analyses(&self) -> Result<Vec<AnalysisRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ANALYSIS_COLUMNS} FROM analyses ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], AnalysisRow::from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    pub fn delete_analysis(&self, id: Uuid) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM analyses WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    // ─── Documents ───────────────────────────────────────

    pub fn insert_document(&self, doc: &DocumentRecord) -> Result<()> {
        self.conn.execute(
            &format!("INSERT INTO documents ({DOCUMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                doc.id.to_string(),
                doc.name,
                doc.status.as_str(),
                doc.total_chunks as i64,
                doc.char_count as i64,
                doc.error,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn update_document(&self, doc: &DocumentRecord) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE documents SET status = ?2, total_chunks = ?3, error = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                doc.id.to_string(),
                doc.status.as_str(),
                doc.total_chunks as i64,
                doc.error,
                doc.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn get_document_by_name(&self, name: &str) -> Result<Option<DocumentRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE name = ?1"),
                params![name],
                DocumentRow::from_row,
            )
            .optional()?;
        raw.map(DocumentRow::into_record).transpose()
    }

    /// Newest first.
    pub fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], DocumentRow::from_row)?;
        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?.into_record()?);
        }
        Ok(docs)
    }

    pub fn delete_document(&self, id: Uuid) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    /// Mark documents left in `processing` by a previous process as failed.
    pub fn fail_interrupted_documents(&self) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE documents SET status = 'failed', error = 'Interrupted by restart', updated_at = ?1
             WHERE status = 'processing'",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(changed)
    }
}

/// Raw column values; JSON decoding happens outside the rusqlite callback.
struct ConfigRow {
    id: String,
    name: String,
    source_repo: String,
    frontend_repo: Option<String>,
    backend_repo: Option<String>,
    llm: String,
    vector_store: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl ConfigRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            source_repo: row.get(2)?,
            frontend_repo: row.get(3)?,
            backend_repo: row.get(4)?,
            llm: row.get(5)?,
            vector_store: row.get(6)?,
            is_active: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_configuration(self) -> Result<Configuration> {
        Ok(Configuration {
            id: parse_uuid(&self.id)?,
            name: self.name,
            source_repo: serde_json::from_str(&self.source_repo).context("Corrupt source_repo")?,
            frontend_repo: self
                .frontend_repo
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("Corrupt frontend_repo")?,
            backend_repo: self
                .backend_repo
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("Corrupt backend_repo")?,
            llm: serde_json::from_str(&self.llm).context("Corrupt llm settings")?,
            vector_store: serde_json::from_str(&self.vector_store)
                .context("Corrupt vector store settings")?,
            is_active: self.is_active,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

struct AnalysisRow {
    id: String,
    configuration_id: Option<String>,
    repo_name: Option<String>,
    file_path: String,
    file_name: String,
    status: String,
    plan: Option<String>,
    raw_response: String,
    error: Option<String>,
    created_at: String,
}

impl AnalysisRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            configuration_id: row.get(1)?,
            repo_name: row.get(2)?,
            file_path: row.get(3)?,
            file_name: row.get(4)?,
            status: row.get(5)?,
            plan: row.get(6)?,
            raw_response: row.get(7)?,
            error: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<AnalysisRecord> {
        Ok(AnalysisRecord {
            id: parse_uuid(&self.id)?,
            configuration_id: self.configuration_id.as_deref().map(parse_uuid).transpose()?,
            repo_name: self.repo_name,
            file_path: self.file_path,
            file_name: self.file_name,
            status: AnalysisStatus::from_str_lossy(&self.status),
            plan: self
                .plan
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("Corrupt migration plan")?,
            raw_response: self.raw_response,
            error: self.error,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

struct DocumentRow {
    id: String,
    name: String,
    status: String,
    total_chunks: i64,
    char_count: i64,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            status: row.get(2)?,
            total_chunks: row.get(3)?,
            char_count: row.get(4)?,
            error: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<DocumentRecord> {
        Ok(DocumentRecord {
            id: parse_uuid(&self.id)?,
            name: self.name,
            status: DocumentStatus::from_str_lossy(&self.status),
            total_chunks: self.total_chunks.max(0) as usize,
            char_count: self.char_count.max(0) as usize,
            error: self.error,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("Invalid id in database: {s}"))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp in database: {s}"))?
        .with_timezone(&Utc))
}
