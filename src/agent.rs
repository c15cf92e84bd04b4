//! Agentic tool loop: request, tool calls, tool results, request again.
//!
//! The model reads before it writes by chaining tool calls across
//! iterations; results are appended as tool-role messages so each follow-up
//! request sees them. Iteration caps guarantee termination even when the
//! model never stops asking for tools.

use crate::llm::{parse_tool_arguments, ChatMessage, LlmClient, Role, DEFAULT_MAX_TOKENS};
use crate::store::MemoryStore;
use crate::tools::execute_tool;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

/// Conversation window for interactive chat.
pub const MAX_MESSAGES_IN_CONTEXT: usize = 50;
/// Conversation window for end-of-session consolidation.
pub const CONSOLIDATION_MAX_MESSAGES: usize = 60;
/// Tool-loop cap for interactive chat.
pub const CHAT_MAX_ITERATIONS: u32 = 10;
/// Tool-loop cap for consolidation.
pub const CONSOLIDATION_MAX_ITERATIONS: u32 = 25;

/// Progress events emitted while the loop runs, for display.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Streamed content fragment from the first response.
    ContentDelta(String),
    /// A tool call is about to execute.
    ToolCallStarted { name: String, args: String },
    /// A tool call finished with this result.
    ToolCallCompleted { name: String, result: String },
    /// Final (non-streamed) response text.
    FinalResponse(String),
}

#[derive(Debug, Clone)]
pub struct AgentLoopOptions {
    pub max_iterations: u32,
    pub max_messages_in_context: usize,
    /// Stream the first response's content deltas over the event channel.
    pub stream_first_response: bool,
}

impl AgentLoopOptions {
    pub fn chat() -> Self {
        Self {
            max_iterations: CHAT_MAX_ITERATIONS,
            max_messages_in_context: MAX_MESSAGES_IN_CONTEXT,
            stream_first_response: true,
        }
    }

    pub fn consolidation() -> Self {
        Self {
            max_iterations: CONSOLIDATION_MAX_ITERATIONS,
            max_messages_in_context: CONSOLIDATION_MAX_MESSAGES,
            stream_first_response: false,
        }
    }
}

#[derive(Debug)]
pub struct AgentLoopOutcome {
    /// Full message history including tool calls and results.
    pub messages: Vec<ChatMessage>,
    /// The final assistant text, empty when the model failed to respond.
    pub final_response: String,
    pub iterations: u32,
}

/// Truncate a conversation to the most recent messages, preserving system
/// messages and cutting only at turn boundaries: an assistant message that
/// requested tools is never separated from its tool results.
pub fn truncate_messages(messages: &[ChatMessage], max_messages: usize) -> Vec<ChatMessage> {
    if messages.is_empty() {
        return Vec::new();
    }

    let system: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .cloned()
        .collect();
    let conversation: Vec<ChatMessage> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();
    if conversation.len() <= max_messages {
        return messages.to_vec();
    }

    // Safe cut points: each user message, or an assistant message that is
    // not a continuation after tool results.
    let mut cut_points = Vec::new();
    for (i, msg) in conversation.iter().enumerate() {
        match msg.role {
            Role::User => cut_points.push(i),
            Role::Assistant if i > 0 && conversation[i - 1].role != Role::Tool => {
                cut_points.push(i)
            }
            _ => {}
        }
    }

    let best_cut = conversation.len() - max_messages;
    let chosen_cut = cut_points
        .iter()
        .copied()
        .find(|cp| *cp >= best_cut)
        .or_else(|| cut_points.last().copied())
        .unwrap_or(best_cut);

    let mut result = system;
    result.extend_from_slice(&conversation[chosen_cut..]);
    result
}

/// Drive the loop until the model stops requesting tools or the iteration
/// cap is hit. LLM failures end the loop with an empty final response; they
/// never propagate.
pub async fn run_agent_loop(
    llm: &LlmClient,
    store: &MemoryStore,
    initial_messages: Vec<ChatMessage>,
    tools: &[Value],
    options: AgentLoopOptions,
    event_tx: Option<mpsc::Sender<AgentEvent>>,
) -> AgentLoopOutcome {
    let emit = |event: AgentEvent| {
        if let Some(tx) = &event_tx {
            let _ = tx.try_send(event);
        }
    };

    let mut messages = initial_messages;
    let mut final_response = String::new();
    let mut iteration = 0u32;

    while iteration < options.max_iterations {
        iteration += 1;
        messages = truncate_messages(&messages, options.max_messages_in_context);

        let should_stream =
            options.stream_first_response && iteration == 1 && event_tx.is_some();

        let response = if should_stream {
            let (delta_tx, mut delta_rx) = mpsc::channel::<String>(64);
            let forward_tx = event_tx.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(delta) = delta_rx.recv().await {
                    if let Some(tx) = &forward_tx {
                        let _ = tx.send(AgentEvent::ContentDelta(delta)).await;
                    }
                }
            });
            let result = llm
                .call_streaming(&messages, Some(tools), DEFAULT_MAX_TOKENS, delta_tx)
                .await;
            let _ = forwarder.await;
            result
        } else {
            llm.call(&messages, Some(tools), DEFAULT_MAX_TOKENS).await
        };

        let message = match response {
            Ok(message) => message,
            Err(e) => {
                warn!("Agent loop LLM call failed: {}", e);
                break;
            }
        };

        let tool_calls = message.tool_calls.clone().unwrap_or_default();
        messages.push(ChatMessage {
            role: Role::Assistant,
            content: message.content.clone(),
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls.clone())
            },
            tool_call_id: None,
            name: None,
        });

        if tool_calls.is_empty() {
            final_response = message.content.unwrap_or_default();
            if !should_stream && !final_response.is_empty() {
                emit(AgentEvent::FinalResponse(final_response.clone()));
            }
            break;
        }

        for (i, call) in tool_calls.iter().enumerate() {
            let name = call.function.name.clone();
            let args = parse_tool_arguments(call);
            emit(AgentEvent::ToolCallStarted {
                name: name.clone(),
                args: args.to_string(),
            });

            let result = execute_tool(store, &name, &args).await;
            emit(AgentEvent::ToolCallCompleted {
                name: name.clone(),
                result: result.clone(),
            });

            let tool_call_id = call
                .id
                .clone()
                .unwrap_or_else(|| format!("call_{}", i));
            messages.push(ChatMessage::tool_result(tool_call_id, name, result));
        }
    }

    AgentLoopOutcome {
        messages,
        final_response,
        iterations: iteration,
    }
}
