//! Persistent memory store in markdown format.
//!
//! Everything Memoria knows lives as markdown files inside one memory root
//! (`AI Memory/` under the configured vault). The store owns layout,
//! path-safety, token budgets, and the observation log; every mutation is a
//! whole-file rewrite so a crash can at worst lose the single file being
//! written.

mod archive;
mod core_memory;
mod notes;
mod observations;
pub mod paths;
mod soul;
mod tree;

pub use notes::{Note, NoteInfo, NoteMetadata};
pub use observations::{
    CommitOutcome, ConsolidationPrep, LogOutcome, ObservationEntry, ObservationFile,
};
pub use soul::SoulFile;
pub use tree::GoalKind;

use crate::{MemoriaConfig, MemoriaError, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Name of the memory root directory inside the vault.
pub const MEMORY_FOLDER: &str = "AI Memory";

pub const CORE_MEMORY_FILE: &str = "core-memory.md";
pub const CONTEXT_DIR: &str = "context";
pub const TIMELINES_DIR: &str = "timelines";
pub const ARCHIVE_DIR: &str = "archive";
pub const SOUL_DIR: &str = "soul";
pub const NOTES_DIR: &str = "notes";

const CURRENT_GOALS_SEED: &str = "# Current Goals\n";
const FUTURE_PLANS_SEED: &str = "# Future Plans\n";
const CORE_MEMORY_SEED: &str =
    "# Core Memory\n\nEssential facts about the user. Kept small; loaded at every conversation start.\n";

/// File-backed memory store rooted at `<vault>/AI Memory`.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    vault_path: PathBuf,
    root: PathBuf,
    pub(crate) core_memory_max_tokens: usize,
    pub(crate) observation_max_active: usize,
    pub(crate) observation_max_tokens: usize,
    pub(crate) observation_keep_recent: usize,
}

impl MemoryStore {
    pub fn new(config: &MemoriaConfig) -> Self {
        let root = config.vault_path.join(MEMORY_FOLDER);
        Self {
            vault_path: config.vault_path.clone(),
            root,
            core_memory_max_tokens: config.core_memory_max_tokens,
            observation_max_active: config.observation_max_active,
            observation_max_tokens: config.observation_max_tokens,
            observation_keep_recent: config.observation_keep_recent,
        }
    }

    /// The memory root directory (`<vault>/AI Memory`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The vault directory the store was configured with.
    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    /// All operations short-circuit here before touching disk.
    pub(crate) fn ensure_configured(&self) -> Result<()> {
        if !self.vault_path.is_dir() {
            return Err(MemoriaError::NotConfigured(format!(
                "vault path does not exist or is not a directory: {}",
                self.vault_path.display()
            )));
        }
        Ok(())
    }

    /// True if the memory structure has been initialized at least once.
    pub fn memory_exists(&self) -> bool {
        self.root.join(CORE_MEMORY_FILE).exists()
    }

    /// Create or heal the memory structure. Idempotent: missing files are
    /// reseeded with defaults, existing files are left untouched. Runs the
    /// one-shot legacy-layout migration before seeding.
    pub async fn ensure_structure(&self) -> Result<()> {
        self.ensure_configured()?;
        fs::create_dir_all(&self.root).await?;

        self.migrate_legacy_layout().await?;

        for dir in [CONTEXT_DIR, TIMELINES_DIR, ARCHIVE_DIR, NOTES_DIR, SOUL_DIR] {
            fs::create_dir_all(self.root.join(dir)).await?;
        }

        self.seed_if_missing(&self.root.join(CORE_MEMORY_FILE), CORE_MEMORY_SEED)
            .await?;
        self.seed_if_missing(
            &self.root.join(TIMELINES_DIR).join("current-goals.md"),
            CURRENT_GOALS_SEED,
        )
        .await?;
        self.seed_if_missing(
            &self.root.join(TIMELINES_DIR).join("future-plans.md"),
            FUTURE_PLANS_SEED,
        )
        .await?;
        self.seed_soul_if_missing().await?;

        Ok(())
    }

    /// Upgrade the old single-file layout: a lone `memory.md` with no
    /// context tree becomes `context/legacy.md`, the original content
    /// preserved under a dated import heading.
    async fn migrate_legacy_layout(&self) -> Result<()> {
        let legacy = self.root.join("memory.md");
        if !legacy.exists() || self.root.join(CONTEXT_DIR).exists() {
            return Ok(());
        }

        let content = fs::read_to_string(&legacy).await?;
        let today = Local::now().format("%Y-%m-%d");
        let wrapped = format!("## Legacy memory (imported {})\n\n{}\n", today, content.trim());

        let context_dir = self.root.join(CONTEXT_DIR);
        fs::create_dir_all(&context_dir).await?;
        self.write_file(&context_dir.join("legacy.md"), &wrapped).await?;
        fs::remove_file(&legacy).await?;

        info!("Migrated legacy single-file memory into context/legacy.md");
        Ok(())
    }

    /// Delete the user's memory, sparing the soul store. The agent's
    /// self-concept survives a user-initiated wipe.
    pub async fn forget_user(&self) -> Result<()> {
        self.ensure_configured()?;
        if !self.root.exists() {
            return Ok(());
        }

        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_str() == Some(SOUL_DIR) {
                continue;
            }
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await?;
            } else {
                fs::remove_file(&path).await?;
            }
        }

        info!("Deleted user memory (soul preserved)");
        Ok(())
    }

    /// Relative extensionless addresses of all context and timeline files,
    /// formatted for injection into the system prompt.
    pub async fn build_memory_map(&self) -> Result<String> {
        self.ensure_configured()?;
        let mut paths = Vec::new();
        for dir in [CONTEXT_DIR, TIMELINES_DIR] {
            let base = self.root.join(dir);
            if base.is_dir() {
                self.collect_markdown_paths(&base, dir, &mut paths).await?;
            }
        }
        if paths.is_empty() {
            return Ok(String::new());
        }
        paths.sort();
        let mut map = String::from("## Memory map\n\n");
        for path in paths {
            map.push_str(&format!("- {}\n", path));
        }
        Ok(map)
    }

    async fn collect_markdown_paths(
        &self,
        base: &Path,
        prefix: &str,
        out: &mut Vec<String>,
    ) -> Result<()> {
        let mut stack = vec![(base.to_path_buf(), prefix.to_string())];
        while let Some((dir, rel)) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                if entry.file_type().await?.is_dir() {
                    stack.push((entry.path(), format!("{}/{}", rel, name)));
                } else if let Some(stem) = name.strip_suffix(".md") {
                    out.push(format!("{}/{}", rel, stem));
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn seed_if_missing(&self, path: &Path, seed: &str) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        self.write_file(path, seed).await?;
        debug!("Seeded {}", path.display());
        Ok(())
    }

    /// Whole-file write, creating parent directories as needed.
    pub(crate) async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read a file, returning an empty string when it does not exist.
    pub(crate) async fn read_file_or_empty(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Ok(String::new());
        }
        Ok(fs::read_to_string(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoriaConfig;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> MemoryStore {
        MemoryStore::new(&MemoriaConfig::new(dir.path().to_path_buf()))
    }

    #[tokio::test]
    async fn test_ensure_structure_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_structure().await.unwrap();
        assert!(store.root().join(CORE_MEMORY_FILE).exists());
        assert!(store.root().join(SOUL_DIR).join("observations.md").exists());

        // A second pass leaves existing content alone
        store
            .write_file(&store.root().join(CORE_MEMORY_FILE), "# Core Memory\n\nUser is Ada.\n")
            .await
            .unwrap();
        store.ensure_structure().await.unwrap();
        let content = store
            .read_file_or_empty(&store.root().join(CORE_MEMORY_FILE))
            .await
            .unwrap();
        assert!(content.contains("Ada"));
    }

    #[tokio::test]
    async fn test_not_configured_short_circuits() {
        let config = MemoriaConfig::new(PathBuf::from("/nonexistent/vault/path"));
        let store = MemoryStore::new(&config);
        let err = store.ensure_structure().await.unwrap_err();
        assert!(matches!(err, MemoriaError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_forget_user_spares_soul() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_structure().await.unwrap();
        store
            .write_file(&store.root().join(CONTEXT_DIR).join("personal.md"), "secrets\n")
            .await
            .unwrap();

        store.forget_user().await.unwrap();

        assert!(!store.root().join(CONTEXT_DIR).exists());
        assert!(!store.root().join(CORE_MEMORY_FILE).exists());
        assert!(store.root().join(SOUL_DIR).join("soul.md").exists());
    }

    #[tokio::test]
    async fn test_legacy_migration() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.root()).await.unwrap();
        store
            .write_file(&store.root().join("memory.md"), "User plays chess.\n")
            .await
            .unwrap();

        store.ensure_structure().await.unwrap();

        assert!(!store.root().join("memory.md").exists());
        let migrated = store
            .read_file_or_empty(&store.root().join(CONTEXT_DIR).join("legacy.md"))
            .await
            .unwrap();
        assert!(migrated.contains("## Legacy memory (imported "));
        assert!(migrated.contains("User plays chess."));
    }

    #[tokio::test]
    async fn test_memory_map_lists_nested_paths() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_structure().await.unwrap();
        store
            .write_file(&store.root().join(CONTEXT_DIR).join("work").join("projects.md"), "x\n")
            .await
            .unwrap();

        let map = store.build_memory_map().await.unwrap();
        assert!(map.contains("- context/work/projects"));
        assert!(map.contains("- timelines/current-goals"));
        assert!(!map.contains(".md"));
    }
}
