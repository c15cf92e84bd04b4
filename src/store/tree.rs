//! Context and timeline tree: markdown files addressed by slash-path.
//!
//! The generic read/write pair covers `context/` and `timelines/`. Three
//! namespaces are guarded by normalized name and redirect to their
//! specialized operations: core memory, the archive, and the soul store.

use super::paths::{normalize_name, resolve_dir, resolve_file};
use super::{MemoryStore, TIMELINES_DIR};
use crate::{MemoriaError, Result};
use std::path::Path;
use tokio::fs;

/// Which timeline file a goal lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalKind {
    Current,
    Future,
}

impl GoalKind {
    fn file_name(self) -> &'static str {
        match self {
            GoalKind::Current => "current-goals.md",
            GoalKind::Future => "future-plans.md",
        }
    }

    fn header(self) -> &'static str {
        match self {
            GoalKind::Current => "# Current Goals\n",
            GoalKind::Future => "# Future Plans\n",
        }
    }
}

/// Reject addresses whose first segment names a protected namespace,
/// pointing the caller at the specialized operation instead.
fn guard_protected(path: &str) -> Result<()> {
    let first = path.split(['/', '\\']).next().unwrap_or("");
    match normalize_name(first).as_str() {
        "corememory" => Err(MemoriaError::Validation(
            "core memory is managed separately - use read_core_memory / update_core_memory"
                .to_string(),
        )),
        "archive" => Err(MemoriaError::Validation(
            "the archive is append-only - use archive_memory / read_archive".to_string(),
        )),
        "soul" => Err(MemoriaError::Validation(
            "soul files are managed separately - use update_soul, log_observation or resolve_observation"
                .to_string(),
        )),
        _ => Ok(()),
    }
}

impl MemoryStore {
    /// Read one memory file, or a whole directory.
    ///
    /// A path naming a directory returns the concatenation of every
    /// markdown file beneath it, each section prefixed with a heading
    /// derived from its filename, sorted by filename. Missing paths read
    /// as empty.
    pub async fn read_memory_file(&self, path: &str) -> Result<String> {
        self.ensure_configured()?;
        guard_protected(path)?;

        let dir_candidate = resolve_dir(self.root(), path)?;
        if dir_candidate.is_dir() {
            return self.read_directory(&dir_candidate).await;
        }

        let file = resolve_file(self.root(), path)?;
        let content = self.read_file_or_empty(&file).await?;
        Ok(content.trim().to_string())
    }

    /// Write one memory file (full replacement), creating parent
    /// directories as needed.
    pub async fn write_memory_file(&self, path: &str, content: &str) -> Result<String> {
        guard_protected(path)?;
        let file = resolve_file(self.root(), path)?;
        self.ensure_structure().await?;
        self.write_file(&file, &format!("{}\n", content.trim())).await?;
        Ok(path.to_string())
    }

    /// Append a goal block to a timeline file, creating it with a header
    /// when absent. The append API never replaces existing entries.
    pub async fn append_goal(&self, kind: GoalKind, goal: &str, timeline: &str) -> Result<()> {
        if goal.trim().is_empty() {
            return Err(MemoriaError::Validation("goal is empty".to_string()));
        }
        self.ensure_structure().await?;

        let path = self.root().join(TIMELINES_DIR).join(kind.file_name());
        let mut content = self.read_file_or_empty(&path).await?;
        if content.trim().is_empty() {
            content = kind.header().to_string();
        }

        let block = format!(
            "\n- **Goal:** {}\n- **Timeline:** {}\n",
            goal.trim(),
            timeline.trim()
        );
        content.push_str(&block);
        self.write_file(&path, &content).await
    }

    async fn read_directory(&self, dir: &Path) -> Result<String> {
        let mut files = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let mut entries = fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    stack.push(entry.path());
                } else if entry.path().extension().and_then(|e| e.to_str()) == Some("md") {
                    files.push(entry.path());
                }
            }
        }
        files.sort_by_key(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        });

        let mut sections = Vec::new();
        for file in files {
            let content = self.read_file_or_empty(&file).await?;
            let content = content.trim();
            if content.is_empty() {
                continue;
            }
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            sections.push(format!("## {}\n\n{}", stem, content));
        }
        Ok(sections.join("\n\n"))
    }
}
