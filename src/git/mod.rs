pub mod branch;
pub mod clone;
pub mod manager;

use anyhow::{Context, Result};
use git2::{Cred, FetchOptions, PushOptions, RemoteCallbacks};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};

pub use branch::{create_branch_and_commit, BranchOutcome};
pub use clone::{clone_or_update, head_commit_sha, update, SyncAction, SyncOutcome};
pub use manager::{
    delete, info, list, nsdk_modules, nsdk_screens, tree, CommitInfo, RepositoryInfo, TreeNode,
};

/// HTTPS credentials handed to libgit2 through a callback.
#[derive(Debug, Clone)]
pub struct GitCredentials {
    pub username: String,
    pub token: String,
}

/// libgit2 keeps asking for credentials when they are rejected.
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

fn remote_callbacks(creds: Option<&GitCredentials>) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(creds) = creds {
        let mut attempts = 0;
        callbacks.credentials(move |_url, _username, _allowed| {
            attempts += 1;
            if attempts > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str("authentication failed"));
            }
            Cred::userpass_plaintext(&creds.username, &creds.token)
        });
    }
    callbacks
}

pub(crate) fn fetch_options(creds: Option<&GitCredentials>) -> FetchOptions<'_> {
    let mut fo = FetchOptions::new();
    fo.remote_callbacks(remote_callbacks(creds));
    fo
}

pub(crate) fn push_options(creds: Option<&GitCredentials>) -> PushOptions<'_> {
    let mut po = PushOptions::new();
    po.remote_callbacks(remote_callbacks(creds));
    po
}

/// Accept only URL schemes git can fetch from without shell tricks.
pub fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        anyhow::bail!("Repository URL is required");
    }
    let allowed = ["https://", "http://", "git://", "ssh://", "file://"];
    if !allowed.iter().any(|scheme| url.starts_with(scheme)) {
        anyhow::bail!("Unsupported repository URL scheme: {url}");
    }
    Ok(())
}

/// Local clones use the file transport, which cannot do shallow fetches.
pub(crate) fn is_network_url(url: &str) -> bool {
    !url.trim().starts_with("file://")
}

/// A repository name must be one ordinary path component.
pub fn validate_repo_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && matches!(
            Path::new(name).components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        );
    if !valid {
        anyhow::bail!("Invalid repository name: {name:?}");
    }
    Ok(())
}

/// Join a relative path under `root`, rejecting anything that would escape it.
pub fn safe_join(root: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative);
    if relative.trim().is_empty() {
        anyhow::bail!("Empty path");
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => anyhow::bail!("Path escapes repository: {relative}"),
        }
    }
    Ok(root.join(rel))
}

/// Admission control for git work on local clones: a bounded number of
/// concurrent clones/fetches, and one operation at a time per repository
/// directory.
#[derive(Debug)]
pub struct GitGate {
    permits: Arc<Semaphore>,
    repos: parking_lot::Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl GitGate {
    pub fn new(max_concurrent_syncs: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent_syncs.max(1))),
            repos: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Exclusive access to the repository at `dir`. Waits for any running
    /// operation on the same directory.
    pub async fn lock_repo(&self, dir: &Path) -> OwnedMutexGuard<()> {
        let lock = self
            .repos
            .lock()
            .entry(dir.to_path_buf())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .context("Clone semaphore closed")
    }
}

/// Clone or fast-forward `url` into `target` on the blocking pool.
///
/// Runs under the repository's lock and a sync permit. Both stay with the
/// blocking task, so after a timeout the directory stays locked until git
/// actually returns.
pub async fn sync_repository(
    gate: &GitGate,
    timeout: Duration,
    url: String,
    target: PathBuf,
    branch: String,
    creds: Option<GitCredentials>,
) -> Result<SyncOutcome> {
    let repo_guard = gate.lock_repo(&target).await;
    let permit = gate.permit().await?;

    let task = tokio::task::spawn_blocking(move || {
        let _held = (repo_guard, permit);
        clone_or_update(&url, &target, &branch, creds.as_ref())
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined.context("Clone task panicked")?,
        Err(_) => anyhow::bail!("Git operation timed out after {}s", timeout.as_secs()),
    }
}
