use crate::models::ChatMessage;
use crate::scan::char_prefix;
use crate::vector::SearchHit;

/// Characters of the screen source included in the prompt.
pub const CONTENT_CHARS: usize = 2000;
/// Characters of each retrieved context snippet.
pub const CONTEXT_PREVIEW_CHARS: usize = 300;

const SYSTEM_PROMPT: &str = "\
You are a senior engineer migrating legacy NSDK 4GL applications to Angular \
(frontend) and Spring Boot (backend). You read NSDK screen definitions (.SCR) \
and produce precise, structured migration plans. Answer with a single JSON \
object and nothing else.";

const PLAN_SHAPE: &str = r#"{
  "analysis_summary": "one paragraph describing what the screen does",
  "file_type": "screen",
  "complexity": "low | medium | high",
  "estimated_hours": 8,
  "frontend": {
    "component_type": "form | list | detail | dialog",
    "fields": [{"name": "...", "type": "...", "validation": "..."}],
    "buttons": [{"name": "...", "action": "..."}],
    "angular_components": ["MatFormField", "..."],
    "routing": "/path",
    "dependencies": ["ReactiveFormsModule", "..."]
  },
  "backend": {
    "entity_name": "PascalCase",
    "database_table": "table_name",
    "fields": [{"name": "...", "type": "...", "column": "..."}],
    "endpoints": [{"method": "GET", "path": "/api/...", "description": "..."}],
    "business_logic": ["..."],
    "spring_annotations": ["@Entity", "..."]
  },
  "migration_notes": ["..."],
  "potential_issues": ["..."]
}"#;

/// System + user messages asking for a migration plan of one screen.
pub fn migration_plan_messages(file_name: &str, content: &str, context: &[SearchHit]) -> Vec<ChatMessage> {
    let mut user = format!(
        "Analyze the NSDK file `{file_name}` and produce a migration plan.\n\n\
         ## Source ({CONTENT_CHARS} characters max)\n```\n{}\n```\n",
        char_prefix(content, CONTENT_CHARS)
    );

    if !context.is_empty() {
        user.push_str("\n## Related code from the repository\n");
        for (i, hit) in context.iter().enumerate() {
            user.push_str(&format!(
                "\n### {}. {} (similarity {:.2})\n```\n{}\n```\n",
                i + 1,
                hit.payload.path,
                hit.score,
                char_prefix(&hit.payload.content_preview, CONTEXT_PREVIEW_CHARS)
            ));
        }
    }

    user.push_str("\n## Required JSON shape\n");
    user.push_str(PLAN_SHAPE);

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}
