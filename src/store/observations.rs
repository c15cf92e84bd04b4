//! Append-only observation log.
//!
//! Observations are timestamped notes the agent keeps about the user. Each
//! entry moves through a one-way state machine: active, then resolved with a
//! reason, never deleted. The on-disk format is part of the compatibility
//! surface:
//!
//! ```text
//! # Observations
//!
//! ## Summarized observations (through 2026-07-01)
//! condensed patterns from older entries...
//!
//! ---
//! [2026-08-05 14:01]
//! User keeps postponing the move abroad.
//!
//! ---
//! [2026-08-06 09:30]
//! [resolved: they booked the flight]
//! User talks about leaving but never books anything.
//! ```
//!
//! No caller-facing operation replaces the file wholesale; only
//! consolidation does, and only after archiving the prior content.

use super::{MemoryStore, SOUL_DIR};
use crate::{estimate_tokens, MemoriaError, Result};
use chrono::Local;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

pub(crate) const OBSERVATIONS_FILE: &str = "observations.md";
const OBSERVATIONS_ARCHIVE_FILE: &str = "observations_archive.md";

pub(crate) const OBSERVATIONS_SEED: &str = "# Observations\n\nTimestamped patterns I notice about the user. Entries get resolved when they stop applying, never deleted.\n";

const OBSERVATIONS_HEADER: &str = "# Observations\n";

/// Token ceiling for the context-window projection.
const CONTEXT_MAX_TOKENS: usize = 400;
/// How many of the most recent active entries the projection considers.
const CONTEXT_RECENT_WINDOW: usize = 10;

fn entry_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^---[ \t]*\n\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2})\][ \t]*\n").unwrap()
    })
}

fn summary_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^## Summarized observations \(through (.+?)\)[ \t]*\n?").unwrap()
    })
}

fn resolved_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[resolved: (.*)\][ \t]*$").unwrap())
}

/// One record in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationEntry {
    /// `YYYY-MM-DD HH:MM`, assigned at append time.
    pub timestamp: String,
    /// Single-paragraph body as submitted.
    pub text: String,
    /// Resolution reason. Setting it is monotonic; there is no way back.
    pub resolved: Option<String>,
}

impl ObservationEntry {
    pub fn is_active(&self) -> bool {
        self.resolved.is_none()
    }
}

/// Parsed view of the observations file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationFile {
    /// Header text preceding the summary block and entries.
    pub preamble: String,
    /// Date carried by the summary heading, if a summary block exists.
    pub summary_date: Option<String>,
    /// Condensed text representing entries older than the retained window.
    pub summary: Option<String>,
    pub entries: Vec<ObservationEntry>,
}

/// Byte spans of one entry inside the raw file, used to patch resolution
/// markers in place without rewriting anything else.
struct RawEntry {
    timestamp: String,
    /// Start of the `---` marker line.
    marker_start: usize,
    /// Offset just past the `[timestamp]` line; the body starts here, and a
    /// resolution marker is inserted here.
    after_timestamp: usize,
    body_end: usize,
}

fn scan_entries(content: &str) -> Vec<RawEntry> {
    let matches: Vec<_> = entry_marker_re().captures_iter(content).collect();
    let mut raw = Vec::with_capacity(matches.len());
    for (i, caps) in matches.iter().enumerate() {
        let whole = caps.get(0).unwrap();
        let body_end = matches
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(content.len());
        raw.push(RawEntry {
            timestamp: caps.get(1).unwrap().as_str().to_string(),
            marker_start: whole.start(),
            after_timestamp: whole.end(),
            body_end,
        });
    }
    raw
}

fn parse_entry(content: &str, raw: &RawEntry) -> ObservationEntry {
    let body = &content[raw.after_timestamp..raw.body_end];
    let mut lines = body.lines();
    if let Some(first) = lines.next() {
        if let Some(caps) = resolved_line_re().captures(first) {
            let rest: Vec<&str> = lines.collect();
            return ObservationEntry {
                timestamp: raw.timestamp.clone(),
                text: rest.join("\n").trim().to_string(),
                resolved: Some(caps.get(1).unwrap().as_str().to_string()),
            };
        }
    }
    ObservationEntry {
        timestamp: raw.timestamp.clone(),
        text: body.trim().to_string(),
        resolved: None,
    }
}

impl ObservationFile {
    /// Parse the on-disk format into typed records.
    pub fn parse(content: &str) -> Self {
        let raw = scan_entries(content);
        let head_end = raw.first().map(|r| r.marker_start).unwrap_or(content.len());
        let head = &content[..head_end];

        let (preamble, summary_date, summary) = match summary_heading_re().captures(head) {
            Some(caps) => {
                let heading = caps.get(0).unwrap();
                let date = caps.get(1).unwrap().as_str().to_string();
                let summary_text = head[heading.end()..].trim().to_string();
                (
                    head[..heading.start()].trim_end().to_string(),
                    Some(date),
                    Some(summary_text),
                )
            }
            None => (head.trim_end().to_string(), None, None),
        };

        let entries = raw.iter().map(|r| parse_entry(content, r)).collect();
        Self {
            preamble,
            summary_date,
            summary,
            entries,
        }
    }

    /// Serialize back to the on-disk format. `parse` and `serialize` round-
    /// trip each other modulo insignificant trailing whitespace.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        if self.preamble.trim().is_empty() {
            out.push_str(OBSERVATIONS_HEADER);
        } else {
            out.push_str(self.preamble.trim_end());
            out.push('\n');
        }
        if let Some(summary) = &self.summary {
            let date = self
                .summary_date
                .clone()
                .unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string());
            out.push_str(&format!(
                "\n## Summarized observations (through {})\n{}\n",
                date,
                summary.trim()
            ));
        }
        for entry in &self.entries {
            out.push_str(&format!("\n---\n[{}]\n", entry.timestamp));
            if let Some(reason) = &entry.resolved {
                out.push_str(&format!("[resolved: {}]\n", reason));
            }
            out.push_str(entry.text.trim());
            out.push('\n');
        }
        out
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_active()).count()
    }
}

/// Outcome of a successful append.
#[derive(Debug, Clone, Copy)]
pub struct LogOutcome {
    /// Total entries (active + resolved) now in the file.
    pub entries: usize,
    /// Estimated token count of the whole file.
    pub tokens: usize,
}

/// Outcome of a successful consolidation commit.
#[derive(Debug, Clone, Copy)]
pub struct CommitOutcome {
    pub entries_kept: usize,
    pub tokens: usize,
}

/// Everything the consolidation summarizer needs, split out of the live file.
#[derive(Debug, Clone)]
pub struct ConsolidationPrep {
    /// Oldest entries, formatted for the summarization prompt.
    pub old_entries_text: String,
    /// Newest entries, retained verbatim.
    pub recent_entries: Vec<ObservationEntry>,
    /// Pre-existing summary block, to be incorporated as prior context.
    pub current_summary: Option<String>,
    /// Full original file content, for archiving.
    pub full_content: String,
}

fn is_default_observations(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.is_empty() || trimmed == OBSERVATIONS_SEED.trim()
}

impl MemoryStore {
    fn observations_path(&self) -> std::path::PathBuf {
        self.root().join(SOUL_DIR).join(OBSERVATIONS_FILE)
    }

    fn observations_archive_path(&self) -> std::path::PathBuf {
        self.root().join(SOUL_DIR).join(OBSERVATIONS_ARCHIVE_FILE)
    }

    /// Append one observation. The only way callers add to the file; the
    /// bytes already present are preserved exactly.
    pub async fn log_observation(&self, text: &str) -> Result<LogOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoriaError::Validation("observation is empty".to_string()));
        }
        if text.starts_with('#') {
            return Err(MemoriaError::Validation(
                "observation starts with a heading - log a single entry, not a file rewrite"
                    .to_string(),
            ));
        }
        let multi_entry = Regex::new(r"---[ \t]*\n?[ \t]*\[\d{4}-\d{2}-\d{2}").unwrap();
        if multi_entry.is_match(text) {
            return Err(MemoriaError::Validation(
                "observation contains an embedded entry marker - one entry per call".to_string(),
            ));
        }

        self.ensure_structure().await?;
        let path = self.observations_path();
        let existing = self.read_file_or_empty(&path).await?;
        let now = Local::now().format("%Y-%m-%d %H:%M");
        let entry_block = format!("\n---\n[{}]\n{}\n", now, text);

        let new_content = if is_default_observations(&existing) {
            format!("{}{}", OBSERVATIONS_HEADER, entry_block)
        } else if scan_entries(&existing).is_empty()
            && !summary_heading_re().is_match(&existing)
        {
            // Legacy free-text content: preserve it as an initial summary
            // block dated through today, then start the entry log after it.
            let today = Local::now().format("%Y-%m-%d");
            format!(
                "{}\n## Summarized observations (through {})\n{}\n{}",
                OBSERVATIONS_HEADER,
                today,
                existing.trim(),
                entry_block
            )
        } else {
            format!("{}{}", existing, entry_block)
        };

        self.write_file(&path, &new_content).await?;
        let parsed = ObservationFile::parse(&new_content);
        debug!("Logged observation ({} entries)", parsed.entries.len());
        Ok(LogOutcome {
            entries: parsed.entries.len(),
            tokens: estimate_tokens(&new_content),
        })
    }

    /// Mark the first matching unresolved entry as resolved. Matching walks
    /// entries in file order; for each unresolved entry the timestamp is
    /// tested for the identifier first, then the text (case-insensitive).
    /// Already-resolved entries never match, and resolution cannot be
    /// undone or repeated.
    pub async fn resolve_observation(&self, identifier: &str, reason: &str) -> Result<String> {
        let identifier = identifier.trim();
        let reason = reason.trim();
        if identifier.is_empty() {
            return Err(MemoriaError::Validation("identifier is empty".to_string()));
        }
        if reason.is_empty() {
            return Err(MemoriaError::Validation(
                "a resolution reason is required".to_string(),
            ));
        }

        self.ensure_configured()?;
        let path = self.observations_path();
        let content = self.read_file_or_empty(&path).await?;
        let raw = scan_entries(&content);
        if is_default_observations(&content) || raw.is_empty() {
            return Err(MemoriaError::Validation(
                "no observations logged yet".to_string(),
            ));
        }

        let identifier_lower = identifier.to_lowercase();
        for entry_raw in &raw {
            let entry = parse_entry(&content, entry_raw);
            if !entry.is_active() {
                continue;
            }
            let matched = entry.timestamp.contains(identifier)
                || entry.text.to_lowercase().contains(&identifier_lower);
            if !matched {
                continue;
            }

            // Insert the marker right after the timestamp line; every other
            // byte of the file stays as it was.
            let mut patched = String::with_capacity(content.len() + reason.len() + 16);
            patched.push_str(&content[..entry_raw.after_timestamp]);
            patched.push_str(&format!("[resolved: {}]\n", reason));
            patched.push_str(&content[entry_raw.after_timestamp..]);
            self.write_file(&path, &patched).await?;
            debug!("Resolved observation [{}]", entry.timestamp);
            return Ok(entry.timestamp);
        }

        Err(MemoriaError::Validation(format!(
            "no unresolved observation matching '{}'",
            identifier
        )))
    }

    /// Bounded projection of the log for prompt injection: header and full
    /// summary block always included, then the most recent active entries,
    /// newest first, greedily while the token budget holds. Output keeps
    /// chronological order. A still-default file is returned verbatim.
    pub async fn observations_for_context(&self) -> Result<String> {
        self.ensure_configured()?;
        let content = self
            .read_file_or_empty(&self.observations_path())
            .await?;
        if is_default_observations(&content) {
            return Ok(content.trim().to_string());
        }

        let parsed = ObservationFile::parse(&content);
        let mut head = ObservationFile {
            preamble: parsed.preamble.clone(),
            summary_date: parsed.summary_date.clone(),
            summary: parsed.summary.clone(),
            entries: Vec::new(),
        }
        .serialize();

        let mut remaining =
            CONTEXT_MAX_TOKENS.saturating_sub(estimate_tokens(&head));

        let active: Vec<&ObservationEntry> = parsed
            .entries
            .iter()
            .filter(|e| e.is_active())
            .collect();
        let window_start = active.len().saturating_sub(CONTEXT_RECENT_WINDOW);
        let mut included = Vec::new();
        for entry in active[window_start..].iter().rev() {
            let rendered = format!("\n---\n[{}]\n{}\n", entry.timestamp, entry.text.trim());
            let cost = estimate_tokens(&rendered);
            if cost > remaining {
                break;
            }
            remaining -= cost;
            included.push(rendered);
        }
        included.reverse();
        for rendered in included {
            head.push_str(&rendered);
        }
        Ok(head.trim_end().to_string())
    }

    /// Whether the log has grown past its thresholds.
    pub async fn observations_need_consolidation(&self) -> Result<bool> {
        self.ensure_configured()?;
        let content = self
            .read_file_or_empty(&self.observations_path())
            .await?;
        if is_default_observations(&content) {
            return Ok(false);
        }
        let parsed = ObservationFile::parse(&content);
        Ok(parsed.active_count() > self.observation_max_active
            || estimate_tokens(&content) > self.observation_max_tokens)
    }

    /// Split the log into old entries (to be summarized) and recent ones
    /// (retained verbatim). Returns `None` when there is nothing to do.
    pub async fn prepare_observation_consolidation(
        &self,
    ) -> Result<Option<ConsolidationPrep>> {
        self.ensure_configured()?;
        let content = self
            .read_file_or_empty(&self.observations_path())
            .await?;
        if is_default_observations(&content) {
            return Ok(None);
        }
        let parsed = ObservationFile::parse(&content);
        if parsed.entries.len() <= self.observation_keep_recent {
            return Ok(None);
        }

        let split = parsed.entries.len() - self.observation_keep_recent;
        let (old, recent) = parsed.entries.split_at(split);

        let mut old_text = String::new();
        for entry in old {
            match &entry.resolved {
                Some(reason) => old_text.push_str(&format!(
                    "[{}] (resolved: {})\n{}\n\n",
                    entry.timestamp, reason, entry.text
                )),
                None => old_text.push_str(&format!("[{}]\n{}\n\n", entry.timestamp, entry.text)),
            }
        }

        Ok(Some(ConsolidationPrep {
            old_entries_text: old_text.trim_end().to_string(),
            recent_entries: recent.to_vec(),
            current_summary: parsed.summary.clone(),
            full_content: content,
        }))
    }

    /// Archive the full pre-compression file, then rewrite the live log as
    /// header + fresh summary block + retained entries. This is the only
    /// code path that replaces the observations file wholesale.
    pub async fn commit_observation_consolidation(
        &self,
        summary: &str,
        recent_entries: &[ObservationEntry],
        full_original: &str,
    ) -> Result<CommitOutcome> {
        if summary.trim().is_empty() {
            return Err(MemoriaError::Validation(
                "consolidation summary is empty".to_string(),
            ));
        }
        self.ensure_structure().await?;

        let today = Local::now().format("%Y-%m-%d");

        // Archive first; if the process dies between the two writes the
        // archive holds a redundant copy, never a lost one.
        let archive_path = self.observations_archive_path();
        let mut archive = self.read_file_or_empty(&archive_path).await?;
        if archive.trim().is_empty() {
            archive = "# Observations Archive\n".to_string();
        }
        archive.push_str(&format!(
            "\n## Session: {}\n\n{}\n",
            today,
            full_original.trim()
        ));
        self.write_file(&archive_path, &archive).await?;

        let rewritten = ObservationFile {
            preamble: OBSERVATIONS_HEADER.trim_end().to_string(),
            summary_date: Some(today.to_string()),
            summary: Some(summary.trim().to_string()),
            entries: recent_entries.to_vec(),
        }
        .serialize();
        self.write_file(&self.observations_path(), &rewritten).await?;

        debug!(
            "Observations consolidated ({} entries kept)",
            recent_entries.len()
        );
        Ok(CommitOutcome {
            entries_kept: recent_entries.len(),
            tokens: estimate_tokens(&rewritten),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::{MemoriaConfig, MemoriaError};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> MemoryStore {
        MemoryStore::new(&MemoriaConfig::new(dir.path().to_path_buf()))
    }

    async fn raw_observations(store: &MemoryStore) -> String {
        tokio::fs::read_to_string(store.root().join(SOUL_DIR).join(OBSERVATIONS_FILE))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_log_appends_in_order() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for (i, text) in ["first pattern", "second pattern", "third pattern"]
            .iter()
            .enumerate()
        {
            let outcome = store.log_observation(text).await.unwrap();
            assert_eq!(outcome.entries, i + 1);
        }

        let content = raw_observations(&store).await;
        let parsed = ObservationFile::parse(&content);
        assert_eq!(parsed.entries.len(), 3);
        assert_eq!(parsed.active_count(), 3);
        let texts: Vec<&str> = parsed.entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first pattern", "second pattern", "third pattern"]);
    }

    #[tokio::test]
    async fn test_log_rejects_malformed_and_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.log_observation("a real entry").await.unwrap();
        let before = raw_observations(&store).await;

        assert!(store.log_observation("").await.is_err());
        assert!(store.log_observation("   ").await.is_err());
        assert!(store
            .log_observation("# Observations\nrewritten wholesale")
            .await
            .is_err());
        assert!(store
            .log_observation("one thing\n---\n[2026-01-01 10:00]\nanother thing")
            .await
            .is_err());

        assert_eq!(raw_observations(&store).await, before);
    }

    #[tokio::test]
    async fn test_resolve_is_monotonic() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.log_observation("user avoids the budget topic").await.unwrap();

        let ts = store
            .resolve_observation("budget", "they brought it up themselves")
            .await
            .unwrap();
        assert!(!ts.is_empty());

        // Second resolve on the same entry fails: matching only considers
        // unresolved entries.
        let err = store
            .resolve_observation("budget", "again")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no unresolved observation matching"));

        let content = raw_observations(&store).await;
        let parsed = ObservationFile::parse(&content);
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(
            parsed.entries[0].resolved.as_deref(),
            Some("they brought it up themselves")
        );
        assert_eq!(parsed.entries[0].text, "user avoids the budget topic");
    }

    #[tokio::test]
    async fn test_resolve_timestamp_beats_text_per_entry() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.log_observation("mentions 2031 a lot").await.unwrap();
        store.log_observation("keeps planning for later").await.unwrap();

        // "20" matches the first entry's timestamp before any text test runs.
        let ts = store.resolve_observation("20", "done").await.unwrap();
        let content = raw_observations(&store).await;
        let parsed = ObservationFile::parse(&content);
        assert_eq!(parsed.entries[0].resolved.as_deref(), Some("done"));
        assert!(parsed.entries[1].is_active());
        assert_eq!(ts, parsed.entries[0].timestamp);
    }

    #[tokio::test]
    async fn test_resolve_errors_distinguish_empty_log() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let err = store.resolve_observation("anything", "reason").await.unwrap_err();
        assert!(err.to_string().contains("no observations logged yet"));

        store.log_observation("real entry").await.unwrap();
        let err = store.resolve_observation("zzz-no-match", "reason").await.unwrap_err();
        assert!(err.to_string().contains("no unresolved observation matching"));
    }

    #[tokio::test]
    async fn test_context_projection_skips_resolved_keeps_summary() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.log_observation("user is switching jobs").await.unwrap();
        store.log_observation("user dreads the commute").await.unwrap();

        let view = store.observations_for_context().await.unwrap();
        assert!(view.contains("user is switching jobs"));

        store
            .resolve_observation("switching jobs", "confirmed new job started")
            .await
            .unwrap();
        let view = store.observations_for_context().await.unwrap();
        assert!(!view.contains("user is switching jobs"));
        assert!(view.contains("user dreads the commute"));

        // Summary block survives projection regardless of budget
        let prep_summary = "They are restless about work.";
        let recent = vec![ObservationEntry {
            timestamp: "2026-08-07 10:00".to_string(),
            text: "user dreads the commute".to_string(),
            resolved: None,
        }];
        let content = raw_observations(&store).await;
        store
            .commit_observation_consolidation(prep_summary, &recent, &content)
            .await
            .unwrap();
        let view = store.observations_for_context().await.unwrap();
        assert!(view.contains("## Summarized observations (through "));
        assert!(view.contains(prep_summary));
    }

    #[tokio::test]
    async fn test_context_projection_respects_budget() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        // Each entry ~100 tokens; only a few fit under the 400-token ceiling.
        for i in 0..8 {
            let text = format!("entry {} {}", i, "w".repeat(390));
            store.log_observation(&text).await.unwrap();
        }

        let view = store.observations_for_context().await.unwrap();
        assert!(estimate_tokens(&view) <= CONTEXT_MAX_TOKENS + 8);
        // Newest entries win; the oldest is dropped first
        assert!(view.contains("entry 7"));
        assert!(!view.contains("entry 0 "));

        // Chronological order among what is included
        let pos_6 = view.find("entry 6").unwrap();
        let pos_7 = view.find("entry 7").unwrap();
        assert!(pos_6 < pos_7);
    }

    #[tokio::test]
    async fn test_default_file_returned_verbatim() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_structure().await.unwrap();
        let view = store.observations_for_context().await.unwrap();
        assert_eq!(view, OBSERVATIONS_SEED.trim());
    }

    #[tokio::test]
    async fn test_legacy_content_becomes_summary_block() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.ensure_structure().await.unwrap();
        store
            .write_file(
                &store.root().join(SOUL_DIR).join(OBSERVATIONS_FILE),
                "They seem guarded about family. Warmer when talking about music.\n",
            )
            .await
            .unwrap();

        store.log_observation("new entry after migration").await.unwrap();

        let content = raw_observations(&store).await;
        let parsed = ObservationFile::parse(&content);
        assert!(parsed
            .summary
            .as_deref()
            .unwrap()
            .contains("guarded about family"));
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].text, "new entry after migration");
    }

    #[tokio::test]
    async fn test_needs_consolidation_thresholds() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(!store.observations_need_consolidation().await.unwrap());

        store.log_observation("small entry").await.unwrap();
        assert!(!store.observations_need_consolidation().await.unwrap());

        // Token threshold: one huge entry pushes the file over 800 tokens
        store
            .log_observation(&"wordy ".repeat(600))
            .await
            .unwrap();
        assert!(store.observations_need_consolidation().await.unwrap());
    }

    #[tokio::test]
    async fn test_prepare_and_commit_keep_recent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        for i in 0..13 {
            store.log_observation(&format!("observation number {}", i)).await.unwrap();
        }

        let prep = store
            .prepare_observation_consolidation()
            .await
            .unwrap()
            .expect("13 entries > keep_recent");
        assert_eq!(prep.recent_entries.len(), 10);
        assert!(prep.old_entries_text.contains("observation number 0"));
        assert!(prep.old_entries_text.contains("observation number 2"));
        assert!(!prep.old_entries_text.contains("observation number 3\n"));
        assert!(prep.current_summary.is_none());

        let outcome = store
            .commit_observation_consolidation(
                "They number their observations.",
                &prep.recent_entries,
                &prep.full_content,
            )
            .await
            .unwrap();
        assert_eq!(outcome.entries_kept, 10);

        let content = raw_observations(&store).await;
        let parsed = ObservationFile::parse(&content);
        assert_eq!(parsed.entries.len(), 10);
        assert_eq!(parsed.entries[0].text, "observation number 3");
        assert_eq!(parsed.entries[9].text, "observation number 12");
        assert!(parsed.summary.as_deref().unwrap().contains("number their observations"));

        // Archive holds the full pre-commit content verbatim
        let archive = tokio::fs::read_to_string(
            store.root().join(SOUL_DIR).join(OBSERVATIONS_ARCHIVE_FILE),
        )
        .await
        .unwrap();
        assert!(archive.starts_with("# Observations Archive"));
        assert!(archive.contains("## Session: "));
        assert!(archive.contains(prep.full_content.trim()));
    }

    #[tokio::test]
    async fn test_prepare_none_when_under_watermark() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        for i in 0..10 {
            store.log_observation(&format!("entry {}", i)).await.unwrap();
        }
        assert!(store
            .prepare_observation_consolidation()
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_parse_serialize_round_trip() {
        let file = ObservationFile {
            preamble: "# Observations".to_string(),
            summary_date: Some("2026-07-01".to_string()),
            summary: Some("Condensed history.".to_string()),
            entries: vec![
                ObservationEntry {
                    timestamp: "2026-08-01 09:00".to_string(),
                    text: "active entry".to_string(),
                    resolved: None,
                },
                ObservationEntry {
                    timestamp: "2026-08-02 10:30".to_string(),
                    text: "resolved entry".to_string(),
                    resolved: Some("it passed".to_string()),
                },
            ],
        };
        let serialized = file.serialize();
        let reparsed = ObservationFile::parse(&serialized);
        assert_eq!(reparsed, file);
    }

    #[tokio::test]
    async fn test_commit_rejects_empty_summary() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let err = store
            .commit_observation_consolidation("  ", &[], "full")
            .await
            .unwrap_err();
        assert!(matches!(err, MemoriaError::Validation(_)));
    }
}
