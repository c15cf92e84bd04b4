//! End-of-session memory consolidation.
//!
//! An agentic pass lets the model read memory before rewriting it; after
//! that, the observation log checks its own thresholds and collapses old
//! entries into an LLM summary. Failures are reported, never raised - a
//! broken consolidation must not block session exit.

use crate::agent::{run_agent_loop, AgentEvent, AgentLoopOptions, CONSOLIDATION_MAX_ITERATIONS};
use crate::llm::{ChatMessage, LlmClient};
use crate::prompts::{build_consolidation_user_message, CONSOLIDATION_SYSTEM_PROMPT};
use crate::store::{CommitOutcome, MemoryStore};
use crate::tools::consolidation_tool_schemas;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub const OBSERVATION_SUMMARIZATION_PROMPT: &str = "You are Memoria, summarizing your own observations about a user. Condense the following observation entries into 3-5 distilled patterns. Be concise. Preserve anything that still feels unresolved or contradictory. Write in first person. Output only the summary text - no headers, timestamps, or formatting markers.";

const SUMMARY_MAX_TOKENS: u32 = 500;

/// What happened during consolidation, for display and logging.
#[derive(Debug, Default)]
pub struct ConsolidationReport {
    pub iterations: u32,
    /// The loop ran out of iterations; memory may be partially updated.
    pub hit_iteration_cap: bool,
    /// The model never produced a closing response.
    pub ended_without_response: bool,
    /// Result of the observation-log pass, when it ran and committed.
    pub observations: Option<CommitOutcome>,
}

/// Run the full end-of-session routine: the agentic memory pass, then the
/// observation-log consolidation, unconditionally and in that order.
pub async fn run_consolidation(
    store: &MemoryStore,
    llm: &LlmClient,
    transcript: &[ChatMessage],
    event_tx: Option<mpsc::Sender<AgentEvent>>,
) -> ConsolidationReport {
    let core_memory = store.read_core_memory().await.unwrap_or_else(|e| {
        warn!("Could not read core memory for consolidation: {}", e);
        String::new()
    });
    let soul = store.read_soul().await.unwrap_or_else(|e| {
        warn!("Could not read soul for consolidation: {}", e);
        String::new()
    });

    let messages = vec![
        ChatMessage::system(CONSOLIDATION_SYSTEM_PROMPT),
        ChatMessage::user(build_consolidation_user_message(
            transcript,
            &core_memory,
            &soul,
        )),
    ];

    let outcome = run_agent_loop(
        llm,
        store,
        messages,
        &consolidation_tool_schemas(),
        AgentLoopOptions::consolidation(),
        event_tx,
    )
    .await;

    let mut report = ConsolidationReport {
        iterations: outcome.iterations,
        hit_iteration_cap: outcome.iterations >= CONSOLIDATION_MAX_ITERATIONS,
        ended_without_response: outcome.final_response.is_empty(),
        observations: None,
    };
    if report.hit_iteration_cap {
        warn!("Consolidation hit max iterations; memory may be partially updated");
    }
    if report.ended_without_response {
        warn!("Consolidation ended without a final summary");
    }

    // Always runs, whether or not the main loop touched observations.
    report.observations = consolidate_observations(store, llm).await;
    info!("Memory consolidated ({} iterations)", report.iterations);
    report
}

/// Check thresholds and, when exceeded, summarize the old entries with the
/// LLM, archive the full file, and rewrite the live log. Returns the commit
/// outcome, or `None` when nothing was done.
pub async fn consolidate_observations(
    store: &MemoryStore,
    llm: &LlmClient,
) -> Option<CommitOutcome> {
    match store.observations_need_consolidation().await {
        Ok(true) => {}
        Ok(false) => return None,
        Err(e) => {
            warn!("Observation consolidation check failed: {}", e);
            return None;
        }
    }

    let prep = match store.prepare_observation_consolidation().await {
        Ok(Some(prep)) => prep,
        Ok(None) => return None,
        Err(e) => {
            warn!("Observation consolidation preparation failed: {}", e);
            return None;
        }
    };

    let mut user_message = String::new();
    if let Some(previous) = &prep.current_summary {
        user_message.push_str(&format!(
            "Previous summary to incorporate:\n{}\n\n",
            previous
        ));
    }
    user_message.push_str(&format!(
        "Observations to summarize:\n\n{}",
        prep.old_entries_text
    ));

    let messages = vec![
        ChatMessage::system(OBSERVATION_SUMMARIZATION_PROMPT),
        ChatMessage::user(user_message),
    ];

    // The client retries once internally; a second failure degrades to
    // skipping this pass.
    let summary = match llm.call(&messages, None, SUMMARY_MAX_TOKENS).await {
        Ok(message) => message.content.unwrap_or_default().trim().to_string(),
        Err(e) => {
            warn!("Observation consolidation failed (LLM error): {}", e);
            return None;
        }
    };
    if summary.is_empty() {
        warn!("Observation consolidation failed (empty summary)");
        return None;
    }

    match store
        .commit_observation_consolidation(&summary, &prep.recent_entries, &prep.full_content)
        .await
    {
        Ok(outcome) => {
            info!(
                "Observations consolidated ({} entries kept)",
                outcome.entries_kept
            );
            Some(outcome)
        }
        Err(e) => {
            warn!("Observation consolidation error: {}", e);
            None
        }
    }
}
