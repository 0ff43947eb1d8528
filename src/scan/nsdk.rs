use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::LazyLock;

use super::{extract_all, lower_file_name, Patterns, Scanner};
use crate::models::Technology;

static SCREEN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSCREEN[ \t]+(\w+)").unwrap());
static FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFIELD[ \t]+(\w+)[ \t]+(\w+)").unwrap());
static BUTTON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bBUTTON[ \t]+(\w+)").unwrap());
static VALIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bVALIDATE[ \t]+(.+)").unwrap());
static EVENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bON[ \t]+(\w+)[ \t]+(.+)").unwrap());

static MODULE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bMODULE[ \t]+(\w+)").unwrap());
static FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFUNCTION[ \t]+(\w+)").unwrap());
static VAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bVAR[ \t]+(\w+)").unwrap());
static SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSELECT[ \t]+(.+)").unwrap());
static CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bCALL[ \t]+(\w+)").unwrap());

/// Metadata for `.SCR` screens and `.NCL` modules. `.INC` and `.PRG` files
/// only get line/char counts.
pub struct NsdkScanner;

impl Scanner for NsdkScanner {
    fn technology(&self) -> Technology {
        Technology::Nsdk
    }

    fn classify(&self, path: &Path) -> Option<&'static str> {
        let name = lower_file_name(path);
        if name.ends_with(".scr") {
            Some("scr")
        } else if name.ends_with(".ncl") {
            Some("ncl")
        } else if name.ends_with(".inc") {
            Some("inc")
        } else if name.ends_with(".prg") {
            Some("prg")
        } else {
            None
        }
    }

    fn extract(&self, kind: &str, content: &str) -> Patterns {
        match kind {
            "scr" => {
                let mut patterns = extract_all(
                    &[
                        ("fields", &*FIELD),
                        ("buttons", &*BUTTON),
                        ("validations", &*VALIDATE),
                        ("events", &*EVENT),
                    ],
                    content,
                );
                if let Some(name) = first_capture(&SCREEN_NAME, content) {
                    patterns.insert("screen_name".to_string(), vec![name]);
                }
                patterns
            }
            "ncl" => {
                let mut patterns = extract_all(
                    &[
                        ("functions", &*FUNCTION),
                        ("variables", &*VAR),
                        ("sql_queries", &*SELECT),
                        ("api_calls", &*CALL),
                    ],
                    content,
                );
                if let Some(name) = first_capture(&MODULE_NAME, content) {
                    patterns.insert("module_name".to_string(), vec![name]);
                }
                patterns
            }
            _ => Patterns::new(),
        }
    }
}

fn first_capture(re: &Regex, content: &str) -> Option<String> {
    re.captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Listing entry for an NSDK screen or module.
#[derive(Debug, Clone, Serialize)]
pub struct NsdkSummary {
    /// Declared SCREEN/MODULE name, or the file stem
    pub name: String,
    pub path: String,
    pub kind: String,
    pub line_count: usize,
    pub char_count: usize,
    pub size_kb: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<String>,
}

/// Summarize an NSDK file, keeping the first `limit` functions/fields/buttons.
pub fn summarize(relative_path: &str, content: &str, size_bytes: u64, limit: usize) -> Option<NsdkSummary> {
    let path = Path::new(relative_path);
    let kind = NsdkScanner.classify(path)?;
    let patterns = NsdkScanner.extract(kind, content);

    let take = |key: &str| -> Vec<String> {
        patterns
            .get(key)
            .map(|v| v.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    };
    let declared = match kind {
        "scr" => take("screen_name").into_iter().next(),
        "ncl" => take("module_name").into_iter().next(),
        _ => None,
    };
    let name = declared.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    });

    Some(NsdkSummary {
        name,
        path: relative_path.to_string(),
        kind: kind.to_string(),
        line_count: content.lines().count(),
        char_count: content.chars().count(),
        size_kb: (size_bytes as f64 / 1024.0 * 100.0).round() / 100.0,
        functions: take("functions"),
        fields: take("fields"),
        buttons: take("buttons"),
    })
}
