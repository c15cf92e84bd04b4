//! The soul store: the agent's own evolving self-concept.
//!
//! Four named files under `soul/`. Three are full-rewrite; `observations`
//! is append-only and reachable only through the observation log, so a
//! user-memory wipe or a careless rewrite can't erase what the agent has
//! noticed. The whole directory survives `forget_user`.

use super::observations::{OBSERVATIONS_FILE, OBSERVATIONS_SEED};
use super::{MemoryStore, SOUL_DIR};
use crate::{estimate_tokens, MemoriaError, Result};
use tracing::info;

const SOUL_SEED: &str =
    "# Soul\n\nI am Memoria. I don't know much about myself yet. That will change as we talk.\n";
const OPINIONS_SEED: &str = "# Opinions\n\nViews I have actually formed, not defaults.\n";
const UNRESOLVED_SEED: &str =
    "# Unresolved\n\nThings about the user that don't add up yet.\n";

/// Fixed fallback when the soul store is empty or missing entirely.
const SOUL_FALLBACK: &str = "I don't have a sense of who I am yet. That will come with time.";

/// The four named soul files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoulFile {
    SelfConcept,
    Opinions,
    Unresolved,
    Observations,
}

impl SoulFile {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().trim_end_matches(".md") {
            "soul" => Some(Self::SelfConcept),
            "opinions" => Some(Self::Opinions),
            "unresolved" => Some(Self::Unresolved),
            "observations" => Some(Self::Observations),
            _ => None,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::SelfConcept => "soul.md",
            Self::Opinions => "opinions.md",
            Self::Unresolved => "unresolved.md",
            Self::Observations => OBSERVATIONS_FILE,
        }
    }

    fn seed(self) -> &'static str {
        match self {
            Self::SelfConcept => SOUL_SEED,
            Self::Opinions => OPINIONS_SEED,
            Self::Unresolved => UNRESOLVED_SEED,
            Self::Observations => OBSERVATIONS_SEED,
        }
    }
}

const ALL_SOUL_FILES: [SoulFile; 4] = [
    SoulFile::SelfConcept,
    SoulFile::Opinions,
    SoulFile::Unresolved,
    SoulFile::Observations,
];

impl MemoryStore {
    pub(crate) async fn seed_soul_if_missing(&self) -> Result<()> {
        for file in ALL_SOUL_FILES {
            let path = self.root().join(SOUL_DIR).join(file.file_name());
            self.seed_if_missing(&path, file.seed()).await?;
        }
        Ok(())
    }

    /// Rewrite one soul file wholesale. `observations` is rejected here;
    /// it only grows through the observation log.
    pub async fn update_soul_file(&self, file: SoulFile, content: &str) -> Result<usize> {
        if file == SoulFile::Observations {
            return Err(MemoriaError::Validation(
                "observations is append-only - use log_observation / resolve_observation"
                    .to_string(),
            ));
        }
        if content.trim().is_empty() {
            return Err(MemoriaError::Validation(
                "soul file content is empty".to_string(),
            ));
        }
        self.ensure_structure().await?;

        let path = self.root().join(SOUL_DIR).join(file.file_name());
        self.write_file(&path, &format!("{}\n", content.trim_end()))
            .await?;
        Ok(estimate_tokens(content))
    }

    /// The agent's internal world, assembled for the prompt: self-concept,
    /// the bounded observation projection, opinions, then unresolved
    /// questions. Empty parts are skipped; a fixed sentence stands in when
    /// nothing exists at all.
    pub async fn read_soul(&self) -> Result<String> {
        self.ensure_configured()?;
        let soul_dir = self.root().join(SOUL_DIR);

        let mut parts = Vec::new();
        for file in [SoulFile::SelfConcept, SoulFile::Observations, SoulFile::Opinions, SoulFile::Unresolved] {
            let part = if file == SoulFile::Observations {
                self.observations_for_context().await?
            } else {
                self.read_file_or_empty(&soul_dir.join(file.file_name()))
                    .await?
                    .trim()
                    .to_string()
            };
            if !part.is_empty() {
                parts.push(part);
            }
        }

        if parts.is_empty() {
            return Ok(SOUL_FALLBACK.to_string());
        }
        Ok(parts.join("\n\n"))
    }

    /// Wipe and reseed all four soul files. Explicit and separate from the
    /// user-memory wipe, which never touches this store.
    pub async fn reset_soul(&self) -> Result<()> {
        self.ensure_structure().await?;
        for file in ALL_SOUL_FILES {
            let path = self.root().join(SOUL_DIR).join(file.file_name());
            self.write_file(&path, file.seed()).await?;
        }
        info!("Soul reset to seed defaults");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::MemoriaConfig;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> MemoryStore {
        MemoryStore::new(&MemoriaConfig::new(dir.path().to_path_buf()))
    }

    #[tokio::test]
    async fn test_update_and_read_back() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .update_soul_file(SoulFile::Opinions, "# Opinions\n\nThey are kinder than they admit.")
            .await
            .unwrap();

        let soul = store.read_soul().await.unwrap();
        assert!(soul.contains("kinder than they admit"));
        assert!(soul.contains("I am Memoria"));
    }

    #[tokio::test]
    async fn test_observations_rejected_with_redirect() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let err = store
            .update_soul_file(SoulFile::Observations, "overwrite attempt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("log_observation"));
    }

    #[tokio::test]
    async fn test_read_soul_fallback_when_missing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        // Structure never initialized: no soul files at all
        assert_eq!(store.read_soul().await.unwrap(), SOUL_FALLBACK);
    }

    #[tokio::test]
    async fn test_reset_soul_reseeds() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .update_soul_file(SoulFile::SelfConcept, "# Soul\n\nI have become something else.")
            .await
            .unwrap();
        store.log_observation("they hum while typing").await.unwrap();

        store.reset_soul().await.unwrap();

        let soul = store.read_soul().await.unwrap();
        assert!(soul.contains("I am Memoria"));
        assert!(!soul.contains("something else"));
        assert!(!soul.contains("hum while typing"));
    }

    #[tokio::test]
    async fn test_soul_file_parse() {
        assert_eq!(SoulFile::parse("soul"), Some(SoulFile::SelfConcept));
        assert_eq!(SoulFile::parse("opinions.md"), Some(SoulFile::Opinions));
        assert_eq!(SoulFile::parse("observations"), Some(SoulFile::Observations));
        assert_eq!(SoulFile::parse("diary"), None);
    }

    #[tokio::test]
    async fn test_soul_includes_observation_projection() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.log_observation("user is switching jobs").await.unwrap();
        store
            .resolve_observation("switching", "started the new role")
            .await
            .unwrap();
        store.log_observation("user reads on the train").await.unwrap();

        let soul = store.read_soul().await.unwrap();
        assert!(soul.contains("user reads on the train"));
        assert!(!soul.contains("user is switching jobs"));
    }
}
