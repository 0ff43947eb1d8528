use anyhow::{Context, Result};
use git2::{Repository, StatusOptions};
use serde::Serialize;
use std::path::Path;
use walkdir::WalkDir;

use super::validate_repo_name;
use crate::scan::nsdk::{summarize, NsdkSummary};
use crate::scan::{detect::is_nsdk_file, is_hidden_or_ignored, lower_file_name, relative_path};

/// Functions/fields/buttons listed per NSDK file.
const SUMMARY_LIMIT: usize = 10;
pub const DEFAULT_TREE_DEPTH: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub sha: String,
    pub short_sha: String,
    pub message: String,
    pub author: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub path: String,
    pub branch: Option<String>,
    pub last_commit: Option<CommitInfo>,
    pub remote_url: Option<String>,
    pub is_clean: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Directory,
    File,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nsdk: Option<NsdkSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

fn repo_dir(repos_dir: &Path, name: &str) -> Result<std::path::PathBuf> {
    validate_repo_name(name)?;
    let dir = repos_dir.join(name);
    if !dir.join(".git").exists() {
        anyhow::bail!("Repository {name} not found");
    }
    Ok(dir)
}

/// Branch, last commit, remote and working tree state of a cloned repository.
pub fn info(repos_dir: &Path, name: &str) -> Result<RepositoryInfo> {
    let dir = repo_dir(repos_dir, name)?;
    let repo = Repository::open(&dir)
        .with_context(|| format!("Not a git repository: {}", dir.display()))?;

    let head = repo.head().ok();
    let branch = head
        .as_ref()
        .filter(|h| h.is_branch())
        .and_then(|h| h.shorthand().map(str::to_string));

    let last_commit = head.and_then(|h| h.peel_to_commit().ok()).map(|commit| {
        let sha = commit.id().to_string();
        let author = commit.author();
        CommitInfo {
            short_sha: sha.chars().take(8).collect(),
            message: commit.summary().unwrap_or_default().to_string(),
            author: author.name().unwrap_or_default().to_string(),
            date: chrono::DateTime::from_timestamp(commit.time().seconds(), 0)
                .map(|d| d.to_rfc3339())
                .unwrap_or_default(),
            sha,
        }
    });

    let remote_url = repo
        .find_remote("origin")
        .ok()
        .and_then(|r| r.url().map(str::to_string));

    let mut opts = StatusOptions::new();
    opts.include_untracked(true).include_ignored(false);
    let is_clean = repo.statuses(Some(&mut opts))?.is_empty();

    Ok(RepositoryInfo {
        name: name.to_string(),
        path: dir.display().to_string(),
        branch,
        last_commit,
        remote_url,
        is_clean,
    })
}

/// Every cloned repository, sorted by name. Unreadable ones are skipped.
pub fn list(repos_dir: &Path) -> Result<Vec<RepositoryInfo>> {
    if !repos_dir.exists() {
        return Ok(Vec::new());
    }
    let mut repos = Vec::new();
    for entry in std::fs::read_dir(repos_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !entry.path().join(".git").exists() {
            continue;
        }
        match info(repos_dir, &name) {
            Ok(info) => repos.push(info),
            Err(e) => tracing::warn!("Skipping repository {}: {e:#}", name),
        }
    }
    repos.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(repos)
}

/// Remove a cloned repository. Returns false when it did not exist.
pub fn delete(repos_dir: &Path, name: &str) -> Result<bool> {
    validate_repo_name(name)?;
    let dir = repos_dir.join(name);
    if !dir.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(&dir).with_context(|| format!("Failed to delete {}", dir.display()))?;
    tracing::info!("Deleted repository {}", name);
    Ok(true)
}

/// Directory tree down to `max_depth`. Hidden entries are skipped; directories
/// come before files, each group ordered case-insensitively.
pub fn tree(repos_dir: &Path, name: &str, max_depth: usize) -> Result<TreeNode> {
    let dir = repo_dir(repos_dir, name)?;
    Ok(TreeNode {
        name: name.to_string(),
        path: String::new(),
        kind: NodeKind::Directory,
        size: None,
        nsdk: None,
        children: build_children(&dir, &dir, 1, max_depth)?,
    })
}

fn build_children(root: &Path, dir: &Path, depth: usize, max_depth: usize) -> Result<Vec<TreeNode>> {
    if depth > max_depth {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        let rel = relative_path(root, &path);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            dirs.push(TreeNode {
                children: build_children(root, &path, depth + 1, max_depth)?,
                name,
                path: rel,
                kind: NodeKind::Directory,
                size: None,
                nsdk: None,
            });
        } else if file_type.is_file() {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let nsdk = if is_nsdk_file(&lower_file_name(&path)) {
                std::fs::read(&path)
                    .ok()
                    .and_then(|b| summarize(&rel, &String::from_utf8_lossy(&b), size, SUMMARY_LIMIT))
            } else {
                None
            };
            files.push(TreeNode {
                name,
                path: rel,
                kind: NodeKind::File,
                size: Some(size),
                nsdk,
                children: Vec::new(),
            });
        }
    }

    dirs.sort_by_key(|n| n.name.to_lowercase());
    files.sort_by_key(|n| n.name.to_lowercase());
    dirs.extend(files);
    Ok(dirs)
}

fn nsdk_files_with_ext(repos_dir: &Path, name: &str, ext: &str) -> Result<Vec<NsdkSummary>> {
    let dir = repo_dir(repos_dir, name)?;
    let mut summaries = Vec::new();
    for entry in WalkDir::new(&dir)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_or_ignored(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        if !lower_file_name(entry.path()).ends_with(ext) {
            continue;
        }
        let bytes = match std::fs::read(entry.path()) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", entry.path().display(), e);
                continue;
            }
        };
        let rel = relative_path(&dir, entry.path());
        let size = bytes.len() as u64;
        if let Some(summary) = summarize(&rel, &String::from_utf8_lossy(&bytes), size, SUMMARY_LIMIT) {
            summaries.push(summary);
        }
    }
    summaries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(summaries)
}

/// `.NCL` modules of a cloned repository.
pub fn nsdk_modules(repos_dir: &Path, name: &str) -> Result<Vec<NsdkSummary>> {
    nsdk_files_with_ext(repos_dir, name, ".ncl")
}

/// `.SCR` screens of a cloned repository.
pub fn nsdk_screens(repos_dir: &Path, name: &str) -> Result<Vec<NsdkSummary>> {
    nsdk_files_with_ext(repos_dir, name, ".scr")
}
