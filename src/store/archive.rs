//! Monthly conversation archive: append-only, `---`-separated.

use super::{MemoryStore, ARCHIVE_DIR};
use crate::{MemoriaError, Result};
use chrono::Local;
use regex::Regex;
use tokio::fs;

const CONVERSATIONS_FILE: &str = "conversations.md";

fn validate_month(month: &str) -> Result<()> {
    let re = Regex::new(r"^\d{4}-\d{2}$").unwrap();
    if !re.is_match(month) {
        return Err(MemoriaError::Validation(format!(
            "invalid archive month '{}', expected YYYY-MM",
            month
        )));
    }
    Ok(())
}

impl MemoryStore {
    /// Append content to the monthly archive, creating the month's file
    /// with a header when absent. Appends never rewrite prior entries.
    pub async fn archive_memory(&self, content: &str, month: Option<&str>) -> Result<String> {
        if content.trim().is_empty() {
            return Err(MemoriaError::Validation("nothing to archive".to_string()));
        }
        self.ensure_structure().await?;

        let month = match month {
            Some(m) => {
                validate_month(m)?;
                m.to_string()
            }
            None => Local::now().format("%Y-%m").to_string(),
        };

        let path = self
            .root()
            .join(ARCHIVE_DIR)
            .join(&month)
            .join(CONVERSATIONS_FILE);
        let mut existing = self.read_file_or_empty(&path).await?;
        if existing.trim().is_empty() {
            existing = format!("# Conversations - {}\n", month);
        }
        existing.push_str(&format!("\n---\n\n{}\n", content.trim()));
        self.write_file(&path, &existing).await?;

        Ok(format!("{}/{}/{}", ARCHIVE_DIR, month, CONVERSATIONS_FILE))
    }

    /// Read one month's archive, or list available months when no month is
    /// given.
    pub async fn read_archive(&self, month: Option<&str>) -> Result<String> {
        self.ensure_configured()?;

        if let Some(month) = month {
            validate_month(month)?;
            let path = self
                .root()
                .join(ARCHIVE_DIR)
                .join(month)
                .join(CONVERSATIONS_FILE);
            let content = self.read_file_or_empty(&path).await?;
            if content.trim().is_empty() {
                return Err(MemoriaError::Validation(format!(
                    "no archive for {}",
                    month
                )));
            }
            return Ok(content.trim().to_string());
        }

        let archive_root = self.root().join(ARCHIVE_DIR);
        let mut months = Vec::new();
        if archive_root.is_dir() {
            let mut entries = fs::read_dir(&archive_root).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    months.push(entry.file_name().to_string_lossy().to_string());
                }
            }
        }
        if months.is_empty() {
            return Ok("(no archives yet)".to_string());
        }
        months.sort();
        let listing: Vec<String> = months.iter().map(|m| format!("- {}", m)).collect();
        Ok(format!("Available archive months:\n{}", listing.join("\n")))
    }
}
