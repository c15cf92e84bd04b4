//! Integration tests for the memory store and its surrounding surfaces.

use memoria::llm::extract_json;
use memoria::store::{MemoryStore, ObservationFile};
use memoria::tools::execute_tool;
use memoria::{estimate_tokens, MemoriaConfig, MemoriaError};
use serde_json::json;
use tempfile::TempDir;

fn store_in(dir: &TempDir) -> MemoryStore {
    MemoryStore::new(&MemoriaConfig::new(dir.path().to_path_buf()))
}

/// The full observation lifecycle: log, project into context, resolve,
/// project again, overflow, consolidate.
#[tokio::test]
async fn test_observation_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir);
    store.ensure_structure().await.unwrap();

    // Fresh store: log one observation
    let outcome = store.log_observation("User is switching jobs").await.unwrap();
    assert_eq!(outcome.entries, 1);

    // It shows up in the context projection, timestamped
    let view = store.observations_for_context().await.unwrap();
    assert!(view.contains("User is switching jobs"));
    assert!(view.contains('['));
    let parsed = ObservationFile::parse(&view);
    assert_eq!(parsed.entries.len(), 1);
    assert_eq!(parsed.entries[0].timestamp.len(), "2026-08-07 12:00".len());

    // Resolve it; the projection drops it
    store
        .resolve_observation("switching jobs", "confirmed new job started")
        .await
        .unwrap();
    let view = store.observations_for_context().await.unwrap();
    assert!(!view.contains("User is switching jobs"));

    // Grow to 11 total entries and consolidate with keep_recent = 10
    for i in 0..10 {
        store
            .log_observation(&format!("pattern number {}", i))
            .await
            .unwrap();
    }
    let prep = store
        .prepare_observation_consolidation()
        .await
        .unwrap()
        .expect("11 entries should be preparable");
    assert_eq!(prep.recent_entries.len(), 10);

    let full_before = prep.full_content.clone();
    store
        .commit_observation_consolidation("They cycle through patterns.", &prep.recent_entries, &prep.full_content)
        .await
        .unwrap();

    // Live file holds exactly the 10 most recent entries plus the summary
    let raw = tokio::fs::read_to_string(store.root().join("soul/observations.md"))
        .await
        .unwrap();
    let parsed = ObservationFile::parse(&raw);
    assert_eq!(parsed.entries.len(), 10);
    assert_eq!(parsed.entries[0].text, "pattern number 0");
    assert!(parsed.summary.as_deref().unwrap().contains("cycle through patterns"));

    // The archive retains the full pre-commit content
    let archive = tokio::fs::read_to_string(store.root().join("soul/observations_archive.md"))
        .await
        .unwrap();
    assert!(archive.contains(full_before.trim()));
}

/// N valid appends produce N active entries in call order.
#[tokio::test]
async fn test_append_count_matches_calls() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir);

    let texts: Vec<String> = (0..7).map(|i| format!("entry number {}", i)).collect();
    for (i, text) in texts.iter().enumerate() {
        let outcome = store.log_observation(text).await.unwrap();
        assert_eq!(outcome.entries, i + 1);
    }

    let raw = tokio::fs::read_to_string(store.root().join("soul/observations.md"))
        .await
        .unwrap();
    let parsed = ObservationFile::parse(&raw);
    assert_eq!(parsed.active_count(), texts.len());

    let mut last_pos = 0;
    for text in &texts {
        let pos = raw.find(text.as_str()).expect("text must be present");
        assert!(pos > last_pos, "entries must appear in call order");
        last_pos = pos;
    }
}

/// Write-then-read returns trimmed content for any unprotected path.
#[tokio::test]
async fn test_tree_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir);

    let content = "  Line one.\nLine two.  \n";
    store.write_memory_file("context/personal", content).await.unwrap();
    let read_back = store.read_memory_file("context/personal").await.unwrap();
    assert_eq!(read_back, content.trim());
}

/// Traversal attempts fail and create nothing outside the vault.
#[tokio::test]
async fn test_path_traversal_blocked() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir);
    store.ensure_structure().await.unwrap();

    for path in ["../../etc/x", "/etc/x", "..\\..\\x", "~/.ssh/authorized_keys", "c:evil"] {
        assert!(
            store.write_memory_file(path, "y").await.is_err(),
            "path should be rejected: {}",
            path
        );
    }

    // Nothing was created outside the memory root
    assert!(!temp_dir.path().parent().unwrap().join("etc").exists());
    assert!(!temp_dir.path().join("etc").exists());
    assert!(!std::path::Path::new("/etc/x.md").exists());
}

/// Core memory boundary: exactly at the ceiling passes, one char over fails.
#[tokio::test]
async fn test_core_memory_boundary() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir);

    assert_eq!(estimate_tokens(&"a".repeat(2000)), 500);
    assert!(store.update_core_memory(&"a".repeat(2000)).await.is_ok());

    let err = store.update_core_memory(&"a".repeat(2001)).await.unwrap_err();
    match err {
        MemoriaError::Validation(msg) => assert!(msg.contains("exceeds")),
        other => panic!("unexpected error: {:?}", other),
    }
}

/// The tool surface mirrors store errors as `Error: ...` strings and keeps
/// the session alive.
#[tokio::test]
async fn test_tool_surface_error_contract() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir);

    let ok = execute_tool(&store, "log_observation", &json!({"text": "likes rain"})).await;
    assert!(!ok.starts_with("Error:"));

    let err = execute_tool(&store, "log_observation", &json!({"text": "# rewrite"})).await;
    assert!(err.starts_with("Error:"));

    let err = execute_tool(&store, "write_memory", &json!({"path": "soul/soul", "content": "x"})).await;
    assert!(err.starts_with("Error:"));
    assert!(err.contains("update_soul"));

    let unknown = execute_tool(&store, "make_coffee", &json!({})).await;
    assert_eq!(unknown, "Unknown tool: make_coffee");
}

/// A user wipe spares the soul; a soul reset spares user memory.
#[tokio::test]
async fn test_forget_and_reset_are_disjoint() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir);
    store.ensure_structure().await.unwrap();

    store.update_core_memory("User is Ada.").await.unwrap();
    store.log_observation("counts in binary").await.unwrap();
    store
        .update_soul_file(memoria::store::SoulFile::Opinions, "# Opinions\n\nSharp.")
        .await
        .unwrap();

    store.forget_user().await.unwrap();
    assert_eq!(store.read_core_memory().await.unwrap(), "");
    let soul = store.read_soul().await.unwrap();
    assert!(soul.contains("counts in binary"));
    assert!(soul.contains("Sharp."));

    store.reset_soul().await.unwrap();
    let soul = store.read_soul().await.unwrap();
    assert!(!soul.contains("counts in binary"));
    assert!(!soul.contains("Sharp."));
}

/// JSON repair recovers an object truncated mid-string.
#[test]
fn test_json_repair_recovers_truncation() {
    let truncated =
        r#"{"action": "update", "path": "context/work", "content": "a value cut mid-sen"#;
    let recovered = extract_json(truncated).expect("repair should succeed");
    assert_eq!(recovered["action"], "update");
    assert_eq!(recovered["path"], "context/work");
    assert_eq!(recovered["content"], "a value cut mid-sen");
}

/// Soul fallback sentence when the store is missing entirely.
#[tokio::test]
async fn test_soul_fallback() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir);
    let soul = store.read_soul().await.unwrap();
    assert_eq!(soul, "I don't have a sense of who I am yet. That will come with time.");
}
