use anyhow::{Context, Result};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::Repository;
use serde::Serialize;
use std::path::Path;

use super::{fetch_options, is_network_url, GitCredentials};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Cloned,
    Updated,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub action: SyncAction,
    pub branch: String,
    pub commit_sha: String,
}

/// Clone `url` into `target`, or fast-forward it when a checkout already exists.
pub fn clone_or_update(
    url: &str,
    target: &Path,
    branch: &str,
    creds: Option<&GitCredentials>,
) -> Result<SyncOutcome> {
    if target.join(".git").exists() {
        return update(target, branch, creds);
    }

    tracing::info!("Cloning {} ({}) into {}", url, branch, target.display());
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut fo = fetch_options(creds);
    if is_network_url(url) {
        fo.depth(1);
    }
    let repo = RepoBuilder::new()
        .branch(branch)
        .fetch_options(fo)
        .clone(url, target)
        .with_context(|| format!("Failed to clone {url} (branch {branch})"))?;

    let commit_sha = head_sha(&repo)?;
    tracing::info!("Clone complete: {} at {}", target.display(), commit_sha);

    Ok(SyncOutcome {
        action: SyncAction::Cloned,
        branch: branch.to_string(),
        commit_sha,
    })
}

/// Fetch `origin/<branch>`, check the branch out and fast-forward it.
pub fn update(
    repo_dir: &Path,
    branch: &str,
    creds: Option<&GitCredentials>,
) -> Result<SyncOutcome> {
    tracing::info!("Updating {} ({})", repo_dir.display(), branch);
    let repo = Repository::open(repo_dir)
        .with_context(|| format!("Not a git repository: {}", repo_dir.display()))?;

    let mut remote = repo
        .find_remote("origin")
        .context("Repository has no origin remote")?;
    let mut fo = fetch_options(creds);
    remote
        .fetch(&[branch], Some(&mut fo), None)
        .with_context(|| format!("Failed to fetch origin/{branch}"))?;

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let fetched = fetch_head
        .peel_to_commit()
        .context("FETCH_HEAD does not point to a commit")?
        .id();

    let refname = format!("refs/heads/{branch}");
    match repo.find_reference(&refname) {
        Ok(mut local) => {
            let current = local.peel_to_commit()?.id();
            if current == fetched || repo.graph_descendant_of(current, fetched)? {
                // already contains everything from origin
            } else if repo.graph_descendant_of(fetched, current)? {
                local.set_target(fetched, "fast-forward")?;
            } else {
                anyhow::bail!("Branch {branch} has diverged from origin; refusing to merge");
            }
        }
        Err(_) => {
            repo.reference(&refname, fetched, false, "create branch from origin")?;
        }
    }

    repo.set_head(&refname)?;
    repo.checkout_head(Some(CheckoutBuilder::new().force()))
        .with_context(|| format!("Failed to check out {branch}"))?;

    let commit_sha = head_sha(&repo)?;
    tracing::info!("Update complete: {} at {}", repo_dir.display(), commit_sha);

    Ok(SyncOutcome {
        action: SyncAction::Updated,
        branch: branch.to_string(),
        commit_sha,
    })
}

/// Full SHA of HEAD.
pub fn head_commit_sha(repo_dir: &Path) -> Result<String> {
    let repo = Repository::open(repo_dir)
        .with_context(|| format!("Not a git repository: {}", repo_dir.display()))?;
    head_sha(&repo)
}

fn head_sha(repo: &Repository) -> Result<String> {
    let commit = repo
        .head()
        .context("Repository has no HEAD")?
        .peel_to_commit()?;
    Ok(commit.id().to_string())
}
