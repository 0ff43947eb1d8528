use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use super::{collect_matches, extract_all, lower_file_name, Patterns, Scanner};
use crate::models::Technology;

static PACKAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*package[ \t]+([\w.]+)[ \t]*;").unwrap());
static CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:public[ \t]+|abstract[ \t]+|final[ \t]+)*(?:class|interface|enum|record)[ \t]+(\w+)")
        .unwrap()
});
static ANNOTATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([A-Z]\w*)").unwrap());
static MAPPING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"@(Get|Post|Put|Delete|Patch|Request)Mapping\b(?:[ \t]*\([ \t]*(?:(?:value|path)[ \t]*=[ \t]*)?\{?[ \t]*"([^"]*)")?"#,
    )
    .unwrap()
});
static TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"@Table[ \t]*\([^)]*\bname[ \t]*=[ \t]*"([^"]+)""#).unwrap());

/// Metadata for Spring Boot sources and build files.
pub struct SpringScanner;

impl Scanner for SpringScanner {
    fn technology(&self) -> Technology {
        Technology::Spring
    }

    fn classify(&self, path: &Path) -> Option<&'static str> {
        let name = lower_file_name(path);
        let kind = if name.ends_with("test.java") || name.ends_with("tests.java") {
            "test"
        } else if name.ends_with("controller.java") {
            "controller"
        } else if name.ends_with("serviceimpl.java") || name.ends_with("service.java") {
            "service"
        } else if name.ends_with("repository.java") {
            "repository"
        } else if name.ends_with("dto.java") {
            "dto"
        } else if name.ends_with("config.java") || name.ends_with("configuration.java") {
            "config"
        } else if name.ends_with(".java") {
            "java"
        } else if matches!(name.as_str(), "pom.xml" | "build.gradle" | "build.gradle.kts") {
            "build"
        } else if matches!(
            name.as_str(),
            "application.properties" | "application.yml" | "application.yaml"
        ) {
            "properties"
        } else {
            return None;
        };
        Some(kind)
    }

    fn extract(&self, kind: &str, content: &str) -> Patterns {
        if matches!(kind, "build" | "properties") {
            return Patterns::new();
        }
        let mut patterns = extract_all(
            &[
                ("package", &*PACKAGE),
                ("classes", &*CLASS),
                ("annotations", &*ANNOTATION),
                ("tables", &*TABLE),
            ],
            content,
        );

        let mut endpoints: Vec<String> = Vec::new();
        for caps in MAPPING.captures_iter(content) {
            let method = match caps.get(1).map_or("", |m| m.as_str()) {
                "Request" => "ANY".to_string(),
                other => other.to_uppercase(),
            };
            let path = caps.get(2).map_or("", |m| m.as_str());
            let endpoint = if path.is_empty() {
                method
            } else {
                format!("{method} {path}")
            };
            if !endpoints.contains(&endpoint) {
                endpoints.push(endpoint);
            }
        }
        if !endpoints.is_empty() {
            patterns.insert("endpoints".to_string(), endpoints);
        }
        patterns
    }

    fn refine_kind(&self, kind: &'static str, patterns: &Patterns) -> &'static str {
        let annotated = |name: &str| {
            patterns
                .get("annotations")
                .is_some_and(|a| a.iter().any(|v| v == name))
        };
        match kind {
            "java" if annotated("Entity") => "entity",
            "java" if annotated("RestController") || annotated("Controller") => "controller",
            "java" if annotated("Service") => "service",
            _ => kind,
        }
    }
}

/// Table names declared with `@Table(name = ...)`.
pub fn table_names(content: &str) -> Vec<String> {
    collect_matches(&TABLE, content)
}
