//! Read-only vault search.
//!
//! A linear scan over the vault's markdown files, filtered by tags and
//! folder, scored by match quality: exact title match beats title-contains
//! beats content occurrence count. Top ten results are returned.

use crate::store::paths::reject_unsafe;
use crate::{MemoriaError, Result};
use glob::glob;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

const MAX_RESULTS: usize = 10;
const PREVIEW_CONTEXT: usize = 100;

fn frontmatter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\A---[ \t]*\n(.*?)\n---").unwrap())
}

fn inline_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // #tag but not ##heading
    RE.get_or_init(|| Regex::new(r"(?:^|[^#\w])#([\w-]+)").unwrap())
}

fn bracket_tags_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"tags:\s*\[(.*?)\]").unwrap())
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub filepath: String,
    pub title: String,
    pub preview: String,
    pub match_type: &'static str,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub total_found: usize,
}

/// Tags from frontmatter (both `tags: [a, b]` and dash-list form) plus
/// inline `#tags`.
fn collect_tags(content: &str) -> Vec<String> {
    let mut tags = Vec::new();

    if let Some(caps) = frontmatter_re().captures(content) {
        let frontmatter = caps.get(1).unwrap().as_str();
        for caps in bracket_tags_re().captures_iter(frontmatter) {
            for tag in caps.get(1).unwrap().as_str().split(',') {
                let tag = tag.trim().trim_matches(['"', '\'']).to_string();
                if !tag.is_empty() {
                    tags.push(tag);
                }
            }
        }
        let mut in_tags = false;
        for line in frontmatter.lines() {
            if line.trim_start().starts_with("tags:") {
                in_tags = true;
                continue;
            }
            if in_tags {
                if let Some(tag) = line.trim_start().strip_prefix("- ") {
                    tags.push(tag.trim().to_string());
                } else if !line.starts_with(' ') && !line.starts_with('\t') {
                    in_tags = false;
                }
            }
        }
    }

    for caps in inline_tag_re().captures_iter(content) {
        tags.push(caps.get(1).unwrap().as_str().to_string());
    }

    tags.sort();
    tags.dedup();
    tags
}

fn relevance(title: &str, content: &str, query_lower: &str) -> (usize, &'static str) {
    let title_lower = title.to_lowercase();
    if title_lower == query_lower {
        return (1000, "title_exact");
    }
    if title_lower.contains(query_lower) {
        return (500, "title_contains");
    }
    let occurrences = content.to_lowercase().matches(query_lower).count();
    if occurrences > 0 {
        return (occurrences * 10, "content_matches");
    }
    (0, "no_match")
}

fn preview_snippet(content: &str, match_pos: usize) -> String {
    let start = match_pos.saturating_sub(PREVIEW_CONTEXT / 2);
    let end = (match_pos + PREVIEW_CONTEXT / 2).min(content.len());
    // Snap to char boundaries
    let start = (0..=start).rev().find(|i| content.is_char_boundary(*i)).unwrap_or(0);
    let end = (end..=content.len())
        .find(|i| content.is_char_boundary(*i))
        .unwrap_or(content.len());

    let snippet: String = content[start..end].split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(&snippet);
    if end < content.len() {
        out.push_str("...");
    }
    out
}

/// Scan the vault for notes matching the query, optionally filtered by tags
/// and restricted to a folder.
pub fn search_vault(
    vault_path: &Path,
    query: &str,
    tags: &[String],
    folder: Option<&str>,
) -> Result<SearchOutcome> {
    if query.trim().is_empty() {
        return Err(MemoriaError::Validation("no search query provided".to_string()));
    }
    if !vault_path.is_dir() {
        return Err(MemoriaError::NotConfigured(format!(
            "vault path does not exist: {}",
            vault_path.display()
        )));
    }

    let search_root = match folder {
        Some(folder) => {
            reject_unsafe(folder)?;
            vault_path.join(folder)
        }
        None => vault_path.to_path_buf(),
    };
    if !search_root.is_dir() {
        return Err(MemoriaError::Validation(format!(
            "folder does not exist: {}",
            search_root.display()
        )));
    }

    let query_lower = query.to_lowercase();
    let tags_lower: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
    let pattern = format!("{}/**/*.md", search_root.display());

    let mut scored: Vec<(usize, SearchResult)> = Vec::new();
    for entry in glob(&pattern).map_err(|e| MemoriaError::Validation(e.to_string()))? {
        let Ok(path) = entry else { continue };
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };

        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let note_tags = collect_tags(&content);

        if !tags_lower.is_empty() {
            let note_tags_lower: Vec<String> =
                note_tags.iter().map(|t| t.to_lowercase()).collect();
            if !tags_lower.iter().any(|t| note_tags_lower.contains(t)) {
                continue;
            }
        }

        let (score, match_type) = relevance(&title, &content, &query_lower);
        if score == 0 {
            continue;
        }

        let preview = match content.to_lowercase().find(&query_lower) {
            Some(pos) => preview_snippet(&content, pos),
            None => content.chars().take(PREVIEW_CONTEXT).collect::<String>().trim().to_string(),
        };

        let filepath = path
            .strip_prefix(vault_path)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();

        scored.push((
            score,
            SearchResult {
                filepath,
                title,
                preview,
                match_type,
                tags: note_tags,
            },
        ));
    }

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    let total_found = scored.len();
    let results = scored
        .into_iter()
        .take(MAX_RESULTS)
        .map(|(_, r)| r)
        .collect();

    Ok(SearchOutcome {
        results,
        total_found,
    })
}

/// Render an outcome for the tool surface.
pub fn format_results(query: &str, outcome: &SearchOutcome) -> String {
    if outcome.results.is_empty() {
        return format!("No notes found matching '{}'", query);
    }

    let mut lines = vec![format!(
        "Found {} note(s) matching '{}':",
        outcome.total_found, query
    )];
    for (i, note) in outcome.results.iter().enumerate() {
        lines.push(format!("\n{}. **{}**", i + 1, note.title));
        lines.push(format!("   Path: {}", note.filepath));
        if !note.tags.is_empty() {
            lines.push(format!("   Tags: {}", note.tags.join(", ")));
        }
        lines.push(format!("   Preview: {}", note.preview));
    }
    if outcome.total_found > outcome.results.len() {
        lines.push(format!(
            "\n(Showing top {} of {} results)",
            outcome.results.len(),
            outcome.total_found
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_title_exact_beats_content() {
        let dir = TempDir::new().unwrap();
        write(&dir, "guitar.md", "An instrument.\n");
        write(&dir, "hobbies.md", "guitar guitar guitar guitar everywhere\n");

        let outcome = search_vault(dir.path(), "guitar", &[], None).unwrap();
        assert_eq!(outcome.total_found, 2);
        assert_eq!(outcome.results[0].title, "guitar");
        assert_eq!(outcome.results[0].match_type, "title_exact");
        assert_eq!(outcome.results[1].match_type, "content_matches");
    }

    #[test]
    fn test_tag_filter() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "tagged.md",
            "---\ntags: [project, work]\n---\n\nproject plan here\n",
        );
        write(&dir, "untagged.md", "another project mention\n");

        let outcome = search_vault(dir.path(), "project", &["work".to_string()], None).unwrap();
        assert_eq!(outcome.total_found, 1);
        assert_eq!(outcome.results[0].title, "tagged");
        assert!(outcome.results[0].tags.contains(&"project".to_string()));
    }

    #[test]
    fn test_inline_and_list_tags() {
        let content = "---\ntags:\n  - alpha\n---\n\nBody with #beta inline, not a ## heading\n";
        let tags = collect_tags(content);
        assert!(tags.contains(&"alpha".to_string()));
        assert!(tags.contains(&"beta".to_string()));
        assert!(!tags.contains(&"heading".to_string()));
    }

    #[test]
    fn test_folder_restriction() {
        let dir = TempDir::new().unwrap();
        write(&dir, "Work/plan.md", "the roadmap\n");
        write(&dir, "Home/plan.md", "the roadmap\n");

        let outcome = search_vault(dir.path(), "roadmap", &[], Some("Work")).unwrap();
        assert_eq!(outcome.total_found, 1);
        assert!(outcome.results[0].filepath.starts_with("Work"));

        assert!(search_vault(dir.path(), "roadmap", &[], Some("Missing")).is_err());
        assert!(search_vault(dir.path(), "roadmap", &[], Some("../etc")).is_err());
    }

    #[test]
    fn test_preview_has_context_markers() {
        let dir = TempDir::new().unwrap();
        let body = format!("{} needle {}", "padding ".repeat(40), "padding ".repeat(40));
        write(&dir, "long.md", &body);

        let outcome = search_vault(dir.path(), "needle", &[], None).unwrap();
        let preview = &outcome.results[0].preview;
        assert!(preview.contains("needle"));
        assert!(preview.starts_with("..."));
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_empty_query_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(search_vault(dir.path(), "  ", &[], None).is_err());
    }

    #[test]
    fn test_caps_at_ten_results() {
        let dir = TempDir::new().unwrap();
        for i in 0..14 {
            write(&dir, &format!("note{}.md", i), "common phrase\n");
        }
        let outcome = search_vault(dir.path(), "common phrase", &[], None).unwrap();
        assert_eq!(outcome.total_found, 14);
        assert_eq!(outcome.results.len(), 10);
        let formatted = format_results("common phrase", &outcome);
        assert!(formatted.contains("Showing top 10 of 14"));
    }
}
