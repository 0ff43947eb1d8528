use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Technology;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Repository,
    Module,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub file_id: String,
    pub error: String,
}

/// Progress record of one vectorization run.
#[derive(Debug, Clone, Serialize)]
pub struct VectorizationBatch {
    pub id: Uuid,
    pub name: String,
    pub kind: BatchKind,
    pub repo_url: String,
    pub branch: String,
    pub technology: Option<Technology>,
    pub module_path: Option<String>,
    pub status: BatchStatus,
    pub total_files: usize,
    pub processed_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,
    pub file_ids: Vec<String>,
    pub error_files: Vec<FileError>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    processed: HashSet<String>,
}

impl VectorizationBatch {
    fn new(name: String, kind: BatchKind, repo_url: String, branch: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            kind,
            repo_url,
            branch,
            technology: None,
            module_path: None,
            status: BatchStatus::Pending,
            total_files: 0,
            processed_files: 0,
            successful_files: 0,
            failed_files: 0,
            file_ids: Vec::new(),
            error_files: Vec::new(),
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            processed: HashSet::new(),
        }
    }

    pub fn progress_percentage(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        self.processed_files as f64 / self.total_files as f64 * 100.0
    }

    pub fn success_rate(&self) -> f64 {
        if self.processed_files == 0 {
            return 0.0;
        }
        self.successful_files as f64 / self.processed_files as f64 * 100.0
    }

    pub fn duration_secs(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    pub fn view(&self) -> BatchView {
        BatchView {
            progress_percentage: self.progress_percentage(),
            success_rate: self.success_rate(),
            duration_secs: self.duration_secs(),
            batch: self.clone(),
        }
    }

    fn transition(&mut self, next: BatchStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            anyhow::bail!(
                "Batch {} cannot move from {:?} to {:?}",
                self.id,
                self.status,
                next
            );
        }
        let now = Utc::now();
        if next == BatchStatus::InProgress {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Returns false when the file was already part of the batch.
    fn add_file(&mut self, file_id: &str) -> bool {
        if self.file_ids.iter().any(|f| f == file_id) {
            return false;
        }
        self.file_ids.push(file_id.to_string());
        self.total_files = self.file_ids.len();
        self.updated_at = Utc::now();
        true
    }

    fn mark_file_processed(&mut self, file_id: &str, error: Option<String>) -> Result<()> {
        if !self.file_ids.iter().any(|f| f == file_id) {
            anyhow::bail!("File {file_id} is not part of batch {}", self.id);
        }
        if !self.processed.insert(file_id.to_string()) {
            anyhow::bail!("File {file_id} was already processed");
        }
        self.processed_files += 1;
        match error {
            None => self.successful_files += 1,
            Some(error) => {
                self.failed_files += 1;
                self.error_files.push(FileError {
                    file_id: file_id.to_string(),
                    error,
                });
            }
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Batch plus its derived figures, as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct BatchView {
    #[serde(flatten)]
    pub batch: VectorizationBatch,
    pub progress_percentage: f64,
    pub success_rate: f64,
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub total_batches: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub files_vectorized: usize,
    pub files_failed: usize,
    pub last_completed_at: Option<DateTime<Utc>>,
}

struct BatchEntry {
    batch: VectorizationBatch,
    cancel: Arc<AtomicBool>,
}

/// In-memory registry of vectorization batches.
#[derive(Default)]
pub struct BatchRegistry {
    batches: RwLock<HashMap<Uuid, BatchEntry>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        name: String,
        kind: BatchKind,
        repo_url: String,
        branch: String,
        module_path: Option<String>,
    ) -> VectorizationBatch {
        let mut batch = VectorizationBatch::new(name, kind, repo_url, branch);
        batch.module_path = module_path;
        let snapshot = batch.clone();
        self.batches.write().insert(
            batch.id,
            BatchEntry {
                batch,
                cancel: Arc::new(AtomicBool::new(false)),
            },
        );
        snapshot
    }

    pub fn get(&self, id: Uuid) -> Option<VectorizationBatch> {
        self.batches.read().get(&id).map(|e| e.batch.clone())
    }

    /// Newest first.
    pub fn list(&self) -> Vec<VectorizationBatch> {
        let mut batches: Vec<_> = self
            .batches
            .read()
            .values()
            .map(|e| e.batch.clone())
            .collect();
        batches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        batches
    }

    fn with_batch<T>(&self, id: Uuid, f: impl FnOnce(&mut VectorizationBatch) -> Result<T>) -> Result<T> {
        let mut batches = self.batches.write();
        let entry = batches
            .get_mut(&id)
            .with_context(|| format!("Batch {id} not found"))?;
        f(&mut entry.batch)
    }

    pub fn start(&self, id: Uuid) -> Result<()> {
        self.with_batch(id, |b| b.transition(BatchStatus::InProgress))
    }

    pub fn set_technology(&self, id: Uuid, technology: Technology) -> Result<()> {
        self.with_batch(id, |b| {
            b.technology = Some(technology);
            b.updated_at = Utc::now();
            Ok(())
        })
    }

    /// Add files, ignoring ids already present. Returns how many were new.
    pub fn add_files<'a>(&self, id: Uuid, file_ids: impl IntoIterator<Item = &'a str>) -> Result<usize> {
        self.with_batch(id, |b| {
            if b.status.is_terminal() {
                anyhow::bail!("Batch {} is already finished", b.id);
            }
            Ok(file_ids.into_iter().filter(|f| b.add_file(f)).count())
        })
    }

    /// Record the outcome for one file. `error` is `None` on success.
    pub fn mark_file_processed(&self, id: Uuid, file_id: &str, error: Option<String>) -> Result<()> {
        self.with_batch(id, |b| b.mark_file_processed(file_id, error))
    }

    pub fn complete(&self, id: Uuid) -> Result<()> {
        self.with_batch(id, |b| b.transition(BatchStatus::Completed))
    }

    pub fn fail(&self, id: Uuid, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.with_batch(id, |b| {
            b.transition(BatchStatus::Failed)?;
            b.error_message = Some(message);
            Ok(())
        })
    }

    /// Cancel a pending or running batch. The pipeline stops before its next file.
    pub fn cancel(&self, id: Uuid) -> Result<VectorizationBatch> {
        let mut batches = self.batches.write();
        let entry = batches
            .get_mut(&id)
            .with_context(|| format!("Batch {id} not found"))?;
        entry.batch.transition(BatchStatus::Cancelled)?;
        entry.cancel.store(true, Ordering::SeqCst);
        Ok(entry.batch.clone())
    }

    pub fn is_cancelled(&self, id: Uuid) -> bool {
        self.batches
            .read()
            .get(&id)
            .is_some_and(|e| e.cancel.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> BatchStats {
        let batches = self.batches.read();
        let mut stats = BatchStats {
            total_batches: batches.len(),
            ..BatchStats::default()
        };
        for entry in batches.values() {
            let b = &entry.batch;
            match b.status {
                BatchStatus::Pending => stats.pending += 1,
                BatchStatus::InProgress => stats.in_progress += 1,
                BatchStatus::Completed => stats.completed += 1,
                BatchStatus::Failed => stats.failed += 1,
                BatchStatus::Cancelled => stats.cancelled += 1,
            }
            stats.files_vectorized += b.successful_files;
            stats.files_failed += b.failed_files;
            if b.status == BatchStatus::Completed {
                stats.last_completed_at = stats.last_completed_at.max(b.completed_at);
            }
        }
        stats
    }
}
