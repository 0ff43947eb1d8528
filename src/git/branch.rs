use anyhow::{Context, Result};
use git2::build::CheckoutBuilder;
use git2::{BranchType, IndexAddOption, Repository, Signature};
use serde::Serialize;
use std::path::Path;

use super::{push_options, safe_join, GitCredentials};

#[derive(Debug, Clone, Serialize)]
pub struct BranchOutcome {
    pub branch: String,
    /// `None` when there was nothing to commit
    pub commit_sha: Option<String>,
    pub files_written: Vec<String>,
    pub pushed: bool,
}

/// First free name among `base`, `base-1`, `base-2`, ... (local or on origin).
pub fn unique_branch_name(repo: &Repository, base: &str) -> Result<String> {
    let taken = |name: &str| {
        repo.find_branch(name, BranchType::Local).is_ok()
            || repo
                .find_branch(&format!("origin/{name}"), BranchType::Remote)
                .is_ok()
    };
    if !taken(base) {
        return Ok(base.to_string());
    }
    for n in 1..1000 {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            tracing::info!("Branch {} exists, using {}", base, candidate);
            return Ok(candidate);
        }
    }
    anyhow::bail!("No free branch name for {base}")
}

/// Branch off HEAD under a unique name, write `files` (relative path, content),
/// commit them and optionally push to `origin`. An empty file set only creates
/// the branch.
pub fn create_branch_and_commit(
    repo_dir: &Path,
    base_branch_name: &str,
    files: &[(String, String)],
    message: &str,
    push: bool,
    creds: Option<&GitCredentials>,
) -> Result<BranchOutcome> {
    let repo = Repository::open(repo_dir)
        .with_context(|| format!("Not a git repository: {}", repo_dir.display()))?;
    let workdir = repo
        .workdir()
        .context("Bare repositories are not supported")?
        .to_path_buf();

    // Validate every path before touching the working tree
    let targets = files
        .iter()
        .map(|(rel, content)| Ok((rel.as_str(), safe_join(&workdir, rel)?, content)))
        .collect::<Result<Vec<_>>>()?;

    let branch = unique_branch_name(&repo, base_branch_name)?;
    let head = repo
        .head()
        .context("Repository has no HEAD")?
        .peel_to_commit()?;
    repo.branch(&branch, &head, false)
        .with_context(|| format!("Failed to create branch {branch}"))?;
    let refname = format!("refs/heads/{branch}");
    repo.set_head(&refname)?;
    repo.checkout_head(Some(CheckoutBuilder::new().safe()))?;
    tracing::info!("Created branch {} in {}", branch, repo_dir.display());

    let mut outcome = BranchOutcome {
        branch: branch.clone(),
        commit_sha: None,
        files_written: Vec::new(),
        pushed: false,
    };

    if !targets.is_empty() {
        for (rel, path, content) in &targets {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content).with_context(|| format!("Failed to write {rel}"))?;
            outcome.files_written.push(rel.to_string());
        }

        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let sig = repo
            .signature()
            .or_else(|_| Signature::now("nsdk-migrator", "nsdk-migrator@localhost"))?;
        let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&head])?;
        tracing::info!("Committed {} files to {} ({})", targets.len(), branch, oid);
        outcome.commit_sha = Some(oid.to_string());
    }

    if push {
        let mut remote = repo
            .find_remote("origin")
            .context("Repository has no origin remote")?;
        let mut po = push_options(creds);
        remote
            .push(&[format!("{refname}:{refname}")], Some(&mut po))
            .with_context(|| format!("Failed to push {branch}"))?;
        tracing::info!("Pushed {} to origin", branch);
        outcome.pushed = true;
    }

    Ok(outcome)
}
