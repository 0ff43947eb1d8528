//! Split extracted documentation text into titled chunks for embedding.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// A whole line of capitals, digits, spaces, dots and dashes, optionally
/// numbered.
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9.\-\s]*[A-Z][A-Z0-9 .\-]+$").unwrap());

/// Section numbering in front of a heading (`3.2 - `).
static NUMBERING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9.\-\s]+").unwrap());

/// Sections longer than this are split into paragraph groups.
pub const SECTION_MAX_CHARS: usize = 2000;
/// Target size of one paragraph group.
pub const GROUP_MAX_CHARS: usize = 1500;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Section,
    Paragraph,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Section => "section",
            Self::Paragraph => "paragraph",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DocChunk {
    /// Display title, `<section> - Part n` for split sections
    pub title: String,
    pub section: String,
    pub content: String,
    pub kind: ChunkKind,
}

fn heading(line: &str) -> Option<String> {
    let line = line.trim();
    if !HEADING.is_match(line) {
        return None;
    }
    let title = NUMBERING.replace(line, "").trim().to_string();
    Some(if title.is_empty() { line.to_string() } else { title })
}

/// Greedy paragraph packing. A paragraph is never split, so one longer than
/// [`GROUP_MAX_CHARS`] becomes a group of its own.
fn paragraph_groups(text: &str) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = String::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if !current.is_empty()
            && current.chars().count() + paragraph.chars().count() > GROUP_MAX_CHARS
        {
            groups.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Chunk documentation text by its upper-case headings. Text before the
/// first heading is not indexed. Without any heading the whole text is
/// packed into numbered paragraph groups.
pub fn chunk_document(text: &str) -> Vec<DocChunk> {
    let text = text.replace("\r\n", "\n");

    let mut sections: Vec<(String, Vec<&str>)> = Vec::new();
    for line in text.lines() {
        if let Some(title) = heading(line) {
            sections.push((title, Vec::new()));
        } else if let Some((_, body)) = sections.last_mut() {
            body.push(line);
        }
    }

    let mut chunks = Vec::new();
    for (title, body) in sections {
        let content = body.join("\n").trim().to_string();
        if content.is_empty() {
            continue;
        }
        if content.chars().count() <= SECTION_MAX_CHARS {
            chunks.push(DocChunk {
                title: title.clone(),
                section: title,
                content,
                kind: ChunkKind::Section,
            });
            continue;
        }
        let groups = paragraph_groups(&content);
        let numbered = groups.len() > 1;
        for (i, group) in groups.into_iter().enumerate() {
            chunks.push(DocChunk {
                title: if numbered {
                    format!("{title} - Part {}", i + 1)
                } else {
                    title.clone()
                },
                section: title.clone(),
                content: group,
                kind: ChunkKind::Section,
            });
        }
    }

    if chunks.is_empty() {
        chunks = paragraph_groups(&text)
            .into_iter()
            .enumerate()
            .map(|(i, content)| {
                let title = format!("Section {}", i + 1);
                DocChunk {
                    section: title.clone(),
                    title,
                    content,
                    kind: ChunkKind::Paragraph,
                }
            })
            .collect();
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_by_heading() {
        let text = "NSDK Reference Manual\nintro text\n\n\
                    1.2 SCREEN CONTROLS\nA screen holds fields.\n\n\
                    BUTTONS\nButtons trigger functions.\n\
                    EMPTY SECTION\n   \n";
        let chunks = chunk_document(text);
        let titles: Vec<_> = chunks.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["SCREEN CONTROLS", "BUTTONS"]);
        assert_eq!(chunks[0].content, "A screen holds fields.");
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Section));
        // preamble before the first heading is dropped
        assert!(!chunks.iter().any(|c| c.content.contains("intro text")));
    }

    #[test]
    fn test_long_section_is_split_into_parts() {
        let paragraph = "x".repeat(900);
        let body = [paragraph.as_str(); 4].join("\n\n");
        let text = format!("DATA ACCESS\n{body}\n");
        let chunks = chunk_document(&text);
        let titles: Vec<_> = chunks.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["DATA ACCESS - Part 1", "DATA ACCESS - Part 2", "DATA ACCESS - Part 3", "DATA ACCESS - Part 4"]);
        assert!(chunks.iter().all(|c| c.section == "DATA ACCESS"));
    }

    #[test]
    fn test_long_single_paragraph_keeps_plain_title() {
        let text = format!("LOOPS\n{}\n", "y".repeat(2500));
        let chunks = chunk_document(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].title, "LOOPS");
        assert_eq!(chunks[0].content.len(), 2500);
    }

    #[test]
    fn test_paragraph_fallback_without_headings() {
        let a = "a".repeat(1000);
        let b = "b".repeat(1000);
        let text = format!("{a}\r\n\r\n{b}\r\n\r\nshort tail");
        let chunks = chunk_document(&text);
        let titles: Vec<_> = chunks.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Section 1", "Section 2"]);
        assert_eq!(chunks[1].content, format!("{b}\n\nshort tail"));
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Paragraph));
        assert!(chunk_document("  \n\n ").is_empty());
    }
}
