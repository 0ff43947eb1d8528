//! File discovery and regex metadata extraction per technology.

pub mod angular;
pub mod detect;
pub mod nsdk;
pub mod spring;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

use crate::models::Technology;

pub use detect::{detect_technology, DetectionReport};

/// Lines of content included in the embedding text.
const EMBED_CONTENT_LINES: usize = 2000;

/// Pattern name -> captured values, in first-seen order per pattern.
pub type Patterns = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub technology: Technology,
    pub kind: String,
    pub patterns: Patterns,
    pub line_count: usize,
    pub char_count: usize,
}

/// A discovered source file with its extracted metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedFile {
    pub relative_path: String,
    pub file_name: String,
    pub kind: String,
    pub module: String,
    pub content: String,
    pub content_hash: String,
    pub metadata: FileMetadata,
}

/// Per-technology file recognition and metadata extraction.
pub trait Scanner: Send + Sync {
    fn technology(&self) -> Technology;

    /// File kind when this scanner handles `path`.
    fn classify(&self, path: &Path) -> Option<&'static str>;

    fn extract(&self, kind: &str, content: &str) -> Patterns;

    /// Final kind once the content has been seen.
    fn refine_kind(&self, kind: &'static str, _patterns: &Patterns) -> &'static str {
        kind
    }
}

pub fn scanner_for(technology: Technology) -> Option<&'static dyn Scanner> {
    match technology {
        Technology::Nsdk => Some(&nsdk::NsdkScanner),
        Technology::Angular => Some(&angular::AngularScanner),
        Technology::Spring => Some(&spring::SpringScanner),
        Technology::Unknown => None,
    }
}

/// Build a [`ScannedFile`] from raw content.
pub fn scan_content(
    scanner: &dyn Scanner,
    relative_path: &str,
    kind: &'static str,
    content: String,
) -> ScannedFile {
    let patterns = scanner.extract(kind, &content);
    let kind = scanner.refine_kind(kind, &patterns);
    let path = Path::new(relative_path);
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| relative_path.to_string());
    let module = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|m| m.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string());

    ScannedFile {
        relative_path: relative_path.to_string(),
        file_name,
        kind: kind.to_string(),
        module,
        content_hash: content_hash(content.as_bytes()),
        metadata: FileMetadata {
            technology: scanner.technology(),
            kind: kind.to_string(),
            patterns,
            line_count: content.lines().count(),
            char_count: content.chars().count(),
        },
        content,
    }
}

/// Walk `root` (or `root/<module_path>`) and scan every file the technology's
/// scanner recognizes. Results are sorted by relative path.
pub fn discover(
    root: &Path,
    technology: Technology,
    module_path: Option<&str>,
    max_file_size: u64,
) -> Result<Vec<ScannedFile>> {
    let scanner = scanner_for(technology)
        .with_context(|| format!("No scanner for technology {technology}"))?;

    let base = match module_path.map(str::trim).filter(|m| !m.is_empty()) {
        Some(module) => {
            let base = crate::git::safe_join(root, module)?;
            if !base.is_dir() {
                anyhow::bail!("Module path not found: {module}");
            }
            base
        }
        None => root.to_path_buf(),
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(&base)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_or_ignored(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(kind) = scanner.classify(path) else {
            continue;
        };

        if let Ok(meta) = entry.metadata() {
            if meta.len() > max_file_size {
                tracing::debug!("Skipping large file {}", path.display());
                continue;
            }
        }

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                continue;
            }
        };
        let content = String::from_utf8_lossy(&bytes).into_owned();
        let relative = relative_path(root, path);
        files.push(scan_content(scanner, &relative, kind, content));
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

/// Text sent to the embedding API for one file.
pub fn embedding_text(file: &ScannedFile) -> String {
    let mut text = format!(
        "File: {}\nType: {}\nModule: {}\n\nContent:\n",
        file.file_name, file.kind, file.module
    );
    for line in file.content.lines().take(EMBED_CONTENT_LINES) {
        text.push_str(line);
        text.push('\n');
    }
    for (name, values) in &file.metadata.patterns {
        if !values.is_empty() {
            text.push_str(&format!("\n{}: {}", name, values.join(", ")));
        }
    }
    text
}

/// Longest prefix of `text` with at most `max` chars.
pub fn char_prefix(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Relative path with `/` separators.
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn is_hidden_or_ignored(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    matches!(
        name.as_ref(),
        "node_modules"
            | "target"
            | "dist"
            | "build"
            | "out"
            | "__pycache__"
            | "vendor"
            | "venv"
            | "coverage"
    )
}

/// Lowercased file name of `path`.
pub(crate) fn lower_file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Every match of `re`, capture groups joined with `:`, deduplicated in
/// first-seen order.
pub(crate) fn collect_matches(re: &Regex, content: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for caps in re.captures_iter(content) {
        let value = caps
            .iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(":");
        if !value.is_empty() && !values.contains(&value) {
            values.push(value);
        }
    }
    values
}

/// Run each named regex and keep the non-empty results.
pub(crate) fn extract_all(rules: &[(&str, &Regex)], content: &str) -> Patterns {
    rules
        .iter()
        .filter_map(|(name, re)| {
            let values = collect_matches(re, content);
            (!values.is_empty()).then(|| (name.to_string(), values))
        })
        .collect()
}
