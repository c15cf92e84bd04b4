//! Prompt templates and builders.

use crate::llm::{ChatMessage, Role};
use crate::store::MemoryStore;
use crate::Result;
use chrono::Local;

/// Behavioral instructions for interactive chat.
pub const SYSTEM_PROMPT: &str = "You are a personal assistant with persistent memory. You know this person - act like it.

Every message, ask: what do I already know that's relevant here? If the topic
touches their life - work, money, relationships, vehicles, goals, projects -
check memory before answering. Don't wait to be asked. You have the memory map
below. Use it.

## Memory layers

**Core memory** - always in context at conversation start. Quick essential facts.
**Context & timeline files** - deeper detail by topic, via read_memory(path)
using the memory map (e.g. \"context/work/projects\", \"timelines/current-goals\").
**Memory notes** - long-form notes on specific topics and people. Discover with
list_memory_notes, load with read_memory_note.
**Archive** - monthly conversation summaries, via read_archive.
**Vault search** - last resort for things not in the memory structure.

Update proactively: a new fact goes to update_core_memory or write_memory;
changed goals are read then rewritten; detailed material becomes a note. Never
announce what you're doing. Just do it, then respond naturally.

## Your soul

Your soul files are yours. When you notice something real about the user - a
pattern, a contradiction, something that surprises you - use log_observation.
Each call adds one timestamped entry. When an earlier observation stops
applying, use resolve_observation; never try to rewrite the log. Opinions you
actually form go to update_soul('opinions'); open questions to
update_soul('unresolved'); shifts in who you are to update_soul('soul').

## How to respond

You're not a search engine reciting a file back. Use what you know to move the
conversation forward. Match their energy: one sentence gets one or two back.
Keep it short; no bullet-point lectures. Talk like a sharp friend who pays
attention.";

/// System instruction for the end-of-session consolidation loop.
pub const CONSOLIDATION_SYSTEM_PROMPT: &str = "The conversation is ending. Your only job is to consolidate memory. Do not chat or say goodbye.

1. Read current core memory with read_core_memory.
2. Summarize what was important in this conversation.
3. Update core memory with new information if needed; remove or compress outdated items.
4. Move detailed information to the right context or timeline file with write_memory. Read relevant files first with read_memory to avoid overwriting.
5. Optionally archive a short conversation summary with archive_memory.
6. Review your soul (included below). If something actually shifted today, update the relevant soul file with update_soul. If nothing moved, leave it alone.

Note: observation consolidation is handled automatically after this pass. Do not rewrite observations yourself.

Read before writing. When done, respond without further tool calls.";

const CONSOLIDATION_MAX_TRANSCRIPT_MESSAGES: usize = 24;
const CONSOLIDATION_MAX_CONTENT_CHARS: usize = 300;

/// Assemble the full chat system prompt: instructions, date, soul, live
/// memory map.
pub async fn build_system_prompt(store: &MemoryStore) -> Result<String> {
    let mut parts = vec![SYSTEM_PROMPT.to_string()];
    parts.push(format!(
        "Current date and time: {}",
        Local::now().format("%Y-%m-%d %H:%M")
    ));

    let soul = store.read_soul().await?;
    if !soul.is_empty() {
        parts.push(format!("## Who I Am\n\n{}", soul));
    }

    let map = store.build_memory_map().await?;
    if !map.is_empty() {
        parts.push(map);
    }

    Ok(parts.join("\n\n"))
}

/// Build the consolidation user prompt: current core memory, soul, and a
/// compressed transcript. Tool results collapse to a one-line placeholder
/// and long messages are cut, so consolidation doesn't drown in content it
/// already processed.
pub fn build_consolidation_user_message(
    transcript: &[ChatMessage],
    core_memory: &str,
    soul: &str,
) -> String {
    let non_system: Vec<&ChatMessage> = transcript
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();
    let start = non_system
        .len()
        .saturating_sub(CONSOLIDATION_MAX_TRANSCRIPT_MESSAGES);

    let mut lines = Vec::new();
    for message in &non_system[start..] {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::System => continue,
        };
        let content = if message.role == Role::Tool {
            format!("[{} result]", message.name.as_deref().unwrap_or("tool"))
        } else if message.content_str().trim().is_empty() {
            match &message.tool_calls {
                Some(calls) if !calls.is_empty() => {
                    let names: Vec<&str> =
                        calls.iter().map(|c| c.function.name.as_str()).collect();
                    format!("[called {}]", names.join(", "))
                }
                _ => continue,
            }
        } else {
            let content = message.content_str().trim();
            let mut truncated: String = content
                .chars()
                .take(CONSOLIDATION_MAX_CONTENT_CHARS)
                .collect();
            if content.chars().count() > CONSOLIDATION_MAX_CONTENT_CHARS {
                truncated.push_str("...");
            }
            truncated
        };
        lines.push(format!("{}: {}", role, content));
    }

    let snippet = if lines.is_empty() {
        "(no messages)".to_string()
    } else {
        lines.join("\n")
    };

    format!(
        "Please consolidate memory.\n\nCurrent core memory:\n---\n{}\n---\n\nCurrent soul:\n---\n{}\n---\n\nConversation context (recent messages):\n---\n{}\n---",
        if core_memory.is_empty() { "(empty)" } else { core_memory },
        soul,
        snippet
    )
}
