//! Free-form memory notes with YAML frontmatter.
//!
//! Long-form information that deserves its own file: topics, people,
//! detailed project notes. Notes live under `notes/`, addressed by title
//! plus optional subfolder; frontmatter tracks `created`, `updated`, and
//! `topics`.

use super::paths::{resolve_dir, resolve_file};
use super::{MemoryStore, NOTES_DIR};
use crate::{MemoriaError, Result};
use chrono::Local;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tokio::fs;

fn frontmatter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\A---[ \t]*\n(.*?)\n---[ \t]*\n?").unwrap())
}

/// Metadata parsed from a note's frontmatter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteMetadata {
    pub created: Option<String>,
    pub updated: Option<String>,
    pub topics: Vec<String>,
}

/// A note read from disk.
#[derive(Debug, Clone)]
pub struct Note {
    /// Path relative to the notes root.
    pub filepath: String,
    /// Body with frontmatter stripped.
    pub content: String,
    pub metadata: NoteMetadata,
}

/// Listing entry.
#[derive(Debug, Clone)]
pub struct NoteInfo {
    pub filepath: String,
    pub title: String,
    pub updated: Option<String>,
    pub topics: Vec<String>,
}

fn parse_metadata(content: &str) -> NoteMetadata {
    let mut metadata = NoteMetadata::default();
    let Some(caps) = frontmatter_re().captures(content) else {
        return metadata;
    };
    let frontmatter = caps.get(1).unwrap().as_str();

    for line in frontmatter.lines() {
        if let Some(value) = line.strip_prefix("created:") {
            metadata.created = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("updated:") {
            metadata.updated = Some(value.trim().to_string());
        }
    }

    let mut in_topics = false;
    for line in frontmatter.lines() {
        if line.trim_start().starts_with("topics:") {
            in_topics = true;
            continue;
        }
        if in_topics {
            let trimmed = line.trim_start();
            if let Some(topic) = trimmed.strip_prefix("- ") {
                metadata.topics.push(topic.trim().to_string());
            } else if !line.starts_with(' ') && !line.starts_with('\t') {
                in_topics = false;
            }
        }
    }
    metadata
}

fn strip_frontmatter(content: &str) -> String {
    frontmatter_re().replace(content, "").trim().to_string()
}

fn format_frontmatter(created: Option<&str>, topics: &[String]) -> String {
    let now = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    let created = created.unwrap_or(&now);
    let mut out = format!("---\ncreated: {}\nupdated: {}\n", created, now);
    if !topics.is_empty() {
        out.push_str("topics:\n");
        for topic in topics {
            out.push_str(&format!("  - {}\n", topic));
        }
    }
    out.push_str("---\n\n");
    out
}

impl MemoryStore {
    fn notes_root(&self) -> std::path::PathBuf {
        self.root().join(NOTES_DIR)
    }

    fn note_path(&self, filename: &str) -> Result<std::path::PathBuf> {
        resolve_file(&self.notes_root(), filename)
    }

    fn relative_note_path(&self, path: &Path) -> String {
        path.strip_prefix(self.notes_root())
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }

    /// Create a new note. Fails if one already exists at the address.
    pub async fn create_note(
        &self,
        title: &str,
        content: &str,
        subfolder: Option<&str>,
        topics: &[String],
    ) -> Result<String> {
        if title.trim().is_empty() {
            return Err(MemoriaError::Validation("note title is empty".to_string()));
        }
        let filename = match subfolder {
            Some(sub) => format!("{}/{}", sub, title),
            None => title.to_string(),
        };
        let path = self.note_path(&filename)?;
        self.ensure_structure().await?;

        if path.exists() {
            return Err(MemoriaError::Validation(format!(
                "note already exists: {}",
                self.relative_note_path(&path)
            )));
        }

        let body = format!("{}{}\n", format_frontmatter(None, topics), content.trim());
        self.write_file(&path, &body).await?;
        Ok(self.relative_note_path(&path))
    }

    /// Read an existing note, frontmatter parsed out.
    pub async fn read_note(&self, filename: &str) -> Result<Note> {
        self.ensure_configured()?;
        let path = self.note_path(filename)?;
        if !path.exists() {
            return Err(MemoriaError::Validation(format!(
                "note not found: {}",
                filename
            )));
        }
        let raw = fs::read_to_string(&path).await?;
        Ok(Note {
            filepath: self.relative_note_path(&path),
            content: strip_frontmatter(&raw),
            metadata: parse_metadata(&raw),
        })
    }

    /// Replace a note's body, or append to it. Preserves the `created`
    /// date and, unless new topics are given, the existing topics.
    pub async fn update_note(
        &self,
        filename: &str,
        new_content: &str,
        topics: Option<&[String]>,
        append: bool,
    ) -> Result<String> {
        self.ensure_configured()?;
        let path = self.note_path(filename)?;
        if !path.exists() {
            return Err(MemoriaError::Validation(format!(
                "note not found: {}",
                filename
            )));
        }

        let old_raw = fs::read_to_string(&path).await?;
        let old_metadata = parse_metadata(&old_raw);
        let topics: Vec<String> = match topics {
            Some(t) => t.to_vec(),
            None => old_metadata.topics.clone(),
        };

        let body = if append {
            format!("{}\n\n{}", strip_frontmatter(&old_raw), new_content.trim())
        } else {
            new_content.trim().to_string()
        };

        let full = format!(
            "{}{}\n",
            format_frontmatter(old_metadata.created.as_deref(), &topics),
            body
        );
        self.write_file(&path, &full).await?;
        Ok(self.relative_note_path(&path))
    }

    /// List notes, most recently updated first.
    pub async fn list_notes(&self, subfolder: Option<&str>) -> Result<Vec<NoteInfo>> {
        self.ensure_configured()?;
        let base = match subfolder {
            Some(sub) => resolve_dir(&self.notes_root(), sub)?,
            None => self.notes_root(),
        };
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut notes = Vec::new();
        let mut stack = vec![base];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
                    let raw = fs::read_to_string(&path).await?;
                    let metadata = parse_metadata(&raw);
                    notes.push(NoteInfo {
                        filepath: self.relative_note_path(&path),
                        title: path
                            .file_stem()
                            .map(|s| s.to_string_lossy().to_string())
                            .unwrap_or_default(),
                        updated: metadata.updated,
                        topics: metadata.topics,
                    });
                }
            }
        }

        notes.sort_by(|a, b| {
            b.updated
                .clone()
                .unwrap_or_default()
                .cmp(&a.updated.clone().unwrap_or_default())
        });
        Ok(notes)
    }

    /// Delete a note. Used sparingly; only on explicit request.
    pub async fn delete_note(&self, filename: &str) -> Result<String> {
        self.ensure_configured()?;
        let path = self.note_path(filename)?;
        if !path.exists() {
            return Err(MemoriaError::Validation(format!(
                "note not found: {}",
                filename
            )));
        }
        fs::remove_file(&path).await?;
        Ok(self.relative_note_path(&path))
    }
}
