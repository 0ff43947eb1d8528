use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use super::{extract_all, lower_file_name, Patterns, Scanner};
use crate::models::Technology;

static CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bexport[ \t]+(?:default[ \t]+)?(?:abstract[ \t]+)?class[ \t]+(\w+)").unwrap());
static DECORATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(Component|Injectable|NgModule|Directive|Pipe)[ \t]*\(").unwrap()
});
static SELECTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bselector[ \t]*:[ \t]*['"`]([^'"`]+)['"`]"#).unwrap());
static ROUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bpath[ \t]*:[ \t]*['"`]([^'"`]*)['"`]"#).unwrap());
static HTTP_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bhttp\.(get|post|put|delete|patch)[ \t]*(?:<[^>\n]*>)?[ \t]*\([ \t]*(?:['"`]([^'"`]*)['"`])?"#)
        .unwrap()
});
static INPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"@Input\([^)]*\)[ \t]*(?:set[ \t]+)?(\w+)"#).unwrap());
static OUTPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"@Output\([^)]*\)[ \t]*(\w+)"#).unwrap());

/// Metadata for Angular sources: components, services, modules, templates.
pub struct AngularScanner;

impl Scanner for AngularScanner {
    fn technology(&self) -> Technology {
        Technology::Angular
    }

    fn classify(&self, path: &Path) -> Option<&'static str> {
        let name = lower_file_name(path);
        let kind = if name.ends_with(".spec.ts") {
            "test"
        } else if name.ends_with(".component.ts") {
            "component"
        } else if name.ends_with(".component.html") {
            "template"
        } else if name.ends_with(".component.scss") || name.ends_with(".component.css") {
            "style"
        } else if name.ends_with("-routing.module.ts") || name.ends_with(".routes.ts") {
            "routing"
        } else if name.ends_with(".module.ts") {
            "module"
        } else if name.ends_with(".service.ts") {
            "service"
        } else if name.ends_with(".model.ts") || name.ends_with(".interface.ts") {
            "model"
        } else if name.ends_with(".ts") {
            "typescript"
        } else if name.ends_with(".html") {
            "html"
        } else if matches!(name.as_str(), "angular.json" | "package.json" | "tsconfig.json") {
            "config"
        } else {
            return None;
        };
        Some(kind)
    }

    fn extract(&self, kind: &str, content: &str) -> Patterns {
        if matches!(kind, "style" | "config") {
            return Patterns::new();
        }
        let mut patterns = extract_all(
            &[
                ("classes", &*CLASS),
                ("decorators", &*DECORATOR),
                ("selectors", &*SELECTOR),
                ("routes", &*ROUTE),
                ("inputs", &*INPUT),
                ("outputs", &*OUTPUT),
            ],
            content,
        );
        let http_calls: Vec<String> = HTTP_CALL
            .captures_iter(content)
            .map(|c| {
                let method = c.get(1).map_or("", |m| m.as_str()).to_uppercase();
                match c.get(2) {
                    Some(url) => format!("{} {}", method, url.as_str()),
                    None => method,
                }
            })
            .fold(Vec::new(), |mut acc, call| {
                if !acc.contains(&call) {
                    acc.push(call);
                }
                acc
            });
        if !http_calls.is_empty() {
            patterns.insert("http_calls".to_string(), http_calls);
        }
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPONENT: &str = r#"
import { Component, Input, Output, EventEmitter } from '@angular/core';

@Component({
  selector: 'app-customer-edit',
  templateUrl: './customer-edit.component.html',
})
export class CustomerEditComponent {
  @Input() customerId: number;
  @Output() saved = new EventEmitter<void>();

  constructor(private http: HttpClient) {}

  load() {
    return this.http.get<Customer>('/api/customers/1');
  }

  save() {
    return this.http.post(this.url, this.form.value);
  }
}
"#;

    #[test]
    fn test_component_patterns() {
        let p = AngularScanner.extract("component", COMPONENT);
        assert_eq!(p["classes"], vec!["CustomerEditComponent"]);
        assert_eq!(p["decorators"], vec!["Component"]);
        assert_eq!(p["selectors"], vec!["app-customer-edit"]);
        assert_eq!(p["inputs"], vec!["customerId"]);
        assert_eq!(p["outputs"], vec!["saved"]);
        assert_eq!(p["http_calls"], vec!["GET /api/customers/1", "POST"]);
    }

    #[test]
    fn test_routes() {
        let routing = "const routes: Routes = [\n  { path: 'customers', component: ListComponent },\n  { path: '', redirectTo: 'customers' }\n];";
        let p = AngularScanner.extract("routing", routing);
        assert_eq!(p["routes"], vec!["customers"]);
    }

    #[test]
    fn test_classify() {
        let kind = |p: &str| AngularScanner.classify(Path::new(p));
        assert_eq!(kind("src/app/a.component.ts"), Some("component"));
        assert_eq!(kind("src/app/a.component.spec.ts"), Some("test"));
        assert_eq!(kind("src/app/app-routing.module.ts"), Some("routing"));
        assert_eq!(kind("src/app/app.module.ts"), Some("module"));
        assert_eq!(kind("src/app/api.service.ts"), Some("service"));
        assert_eq!(kind("angular.json"), Some("config"));
        assert_eq!(kind("src/App.java"), None);
    }
}
