//! Core working memory: one bounded markdown file, always in context.

use super::{MemoryStore, CORE_MEMORY_FILE};
use crate::{estimate_tokens, MemoriaError, Result};
use tracing::debug;

impl MemoryStore {
    /// Read core memory. Empty string if the file does not exist.
    pub async fn read_core_memory(&self) -> Result<String> {
        self.ensure_configured()?;
        let content = self
            .read_file_or_empty(&self.root().join(CORE_MEMORY_FILE))
            .await?;
        Ok(content.trim().to_string())
    }

    /// Rewrite core memory wholesale. Rejected, with nothing written, when
    /// the estimated token count exceeds the ceiling; the store never
    /// truncates or compresses on the caller's behalf.
    pub async fn update_core_memory(&self, content: &str) -> Result<usize> {
        self.ensure_structure().await?;

        let tokens = estimate_tokens(content);
        if tokens > self.core_memory_max_tokens {
            return Err(MemoriaError::Validation(format!(
                "content exceeds core memory limit: {} tokens > {} max",
                tokens, self.core_memory_max_tokens
            )));
        }

        self.write_file(
            &self.root().join(CORE_MEMORY_FILE),
            &format!("{}\n", content.trim_end()),
        )
        .await?;
        debug!("Core memory updated ({} tokens)", tokens);
        Ok(tokens)
    }
}
