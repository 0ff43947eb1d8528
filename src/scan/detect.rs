use serde::Serialize;
use std::path::Path;
use walkdir::WalkDir;

use super::{is_hidden_or_ignored, lower_file_name};
use crate::models::Technology;

/// Per-ecosystem file counts behind a detection.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DetectionReport {
    pub technology: Technology,
    pub nsdk_files: usize,
    pub angular_files: usize,
    pub spring_files: usize,
}

pub(crate) fn is_nsdk_file(name: &str) -> bool {
    [".scr", ".ncl", ".inc", ".prg"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

fn is_angular_marker(name: &str) -> bool {
    name == "angular.json"
        || [".component.ts", ".component.html", ".module.ts", ".service.ts"]
            .iter()
            .any(|suffix| name.ends_with(suffix))
}

fn is_spring_marker(name: &str) -> bool {
    name.ends_with(".java")
        || matches!(
            name,
            "pom.xml"
                | "build.gradle"
                | "build.gradle.kts"
                | "application.properties"
                | "application.yml"
                | "application.yaml"
        )
}

/// Count characteristic files per ecosystem and pick the largest count.
/// A tie for first place, or no matches at all, is `Unknown`.
pub fn detect_technology(root: &Path) -> DetectionReport {
    let mut report = DetectionReport {
        technology: Technology::Unknown,
        nsdk_files: 0,
        angular_files: 0,
        spring_files: 0,
    };

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_or_ignored(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let name = lower_file_name(entry.path());
        if is_nsdk_file(&name) {
            report.nsdk_files += 1;
        }
        if is_angular_marker(&name) {
            report.angular_files += 1;
        }
        if is_spring_marker(&name) {
            report.spring_files += 1;
        }
    }

    report.technology = pick(&[
        (Technology::Nsdk, report.nsdk_files),
        (Technology::Angular, report.angular_files),
        (Technology::Spring, report.spring_files),
    ]);
    tracing::debug!(
        "Detected {} in {} (nsdk={}, angular={}, spring={})",
        report.technology,
        root.display(),
        report.nsdk_files,
        report.angular_files,
        report.spring_files
    );
    report
}

fn pick(counts: &[(Technology, usize)]) -> Technology {
    let max = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
    if max == 0 {
        return Technology::Unknown;
    }
    let mut leaders = counts.iter().filter(|(_, c)| *c == max);
    match (leaders.next(), leaders.next()) {
        (Some((tech, _)), None) => *tech,
        _ => Technology::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_detects_nsdk_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "A.SCR");
        touch(dir.path(), "b.ncl");
        touch(dir.path(), "lib/c.Inc");
        touch(dir.path(), "pom.xml");
        let report = detect_technology(dir.path());
        assert_eq!(report.technology, Technology::Nsdk);
        assert_eq!(report.nsdk_files, 3);
        assert_eq!(report.spring_files, 1);
    }

    #[test]
    fn test_detects_angular() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "angular.json");
        touch(dir.path(), "src/app/app.component.ts");
        touch(dir.path(), "src/app/app.component.html");
        touch(dir.path(), "src/app/app.module.ts");
        touch(dir.path(), "node_modules/x/y.java");
        let report = detect_technology(dir.path());
        assert_eq!(report.technology, Technology::Angular);
        assert_eq!(report.spring_files, 0);
    }

    #[test]
    fn test_detects_spring() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pom.xml");
        touch(dir.path(), "src/main/java/App.java");
        touch(dir.path(), "src/main/resources/application.yml");
        assert_eq!(detect_technology(dir.path()).technology, Technology::Spring);
    }

    #[test]
    fn test_tie_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "A.SCR");
        touch(dir.path(), "App.java");
        assert_eq!(detect_technology(dir.path()).technology, Technology::Unknown);
    }

    #[test]
    fn test_empty_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "README.md");
        let report = detect_technology(dir.path());
        assert_eq!(report.technology, Technology::Unknown);
        assert_eq!(report.nsdk_files + report.angular_files + report.spring_files, 0);
    }
}
