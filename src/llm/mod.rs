//! LLM client for OpenAI-compatible chat completions endpoints.
//!
//! Speaks to a local server (LM Studio, Ollama) or any compatible API.
//! Network failures never crash a session: calls are retried once, then
//! surfaced as an error the caller degrades on.

pub mod json;

pub use json::extract_json;

use crate::{MemoriaConfig, MemoriaError, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One more attempt after the first failure.
const MAX_RETRY_ATTEMPTS: u32 = 2;
const RETRY_BASE_DELAY_MS: u64 = 200;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Default response budget. Raised automatically when tools are attached,
/// since a single memory-update call can carry ~500 tokens of content.
pub const DEFAULT_MAX_TOKENS: u32 = 500;
const TOOL_CALL_MAX_TOKENS: u32 = 4096;

/// Message role on the chat completions wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    #[serde(default)]
    pub name: String,
    /// Arguments arrive either as a JSON-encoded string or as an already-
    /// parsed object, depending on the backend. Both are accepted.
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: ToolCallFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// The assistant message returned by a call: free text, tool requests, or both.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallPayload>>,
}

impl AssistantMessage {
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }
}

/// Parse a tool call's arguments into an object, accepting both wire shapes.
pub fn parse_tool_arguments(call: &ToolCallPayload) -> Value {
    match &call.function.arguments {
        Value::Object(_) => call.function.arguments.clone(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed) if parsed.is_object() => parsed,
            _ => Value::Object(Default::default()),
        },
        _ => Value::Object(Default::default()),
    }
}

// ─── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

// ─── Client ─────────────────────────────────────────────────────────

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(config: &MemoriaConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn effective_max_tokens(tools: Option<&[Value]>, max_tokens: u32) -> u32 {
        if tools.is_some() && max_tokens == DEFAULT_MAX_TOKENS {
            TOOL_CALL_MAX_TOKENS
        } else {
            max_tokens
        }
    }

    /// Non-streaming call. Retried once on failure.
    pub async fn call(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
        max_tokens: u32,
    ) -> Result<AssistantMessage> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.7,
            max_tokens: Self::effective_max_tokens(tools, max_tokens),
            stream: false,
            tools,
        };

        let mut last_error = String::new();
        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            match self.send(&request).await {
                Ok(message) => return Ok(message),
                Err(e) => {
                    last_error = e.to_string();
                    warn!("LLM call failed (attempt {}): {}", attempt, last_error);
                    if attempt < MAX_RETRY_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(
                            RETRY_BASE_DELAY_MS * attempt as u64,
                        ))
                        .await;
                    }
                }
            }
        }
        Err(MemoriaError::Llm(last_error))
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<AssistantMessage> {
        let response = self
            .client
            .post(self.endpoint())
            .json(request)
            .send()
            .await
            .map_err(|e| MemoriaError::Llm(e.to_string()))?
            .error_for_status()
            .map_err(|e| MemoriaError::Llm(e.to_string()))?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| MemoriaError::Llm(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| MemoriaError::Llm("response had no choices".to_string()))
    }

    /// Streaming call. Content deltas are forwarded over `delta_tx` as they
    /// arrive; tool-call fragments are accumulated by index and the
    /// assembled message is returned in the same shape as `call`.
    pub async fn call_streaming(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Value]>,
        max_tokens: u32,
        delta_tx: mpsc::Sender<String>,
    ) -> Result<AssistantMessage> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.7,
            max_tokens: Self::effective_max_tokens(tools, max_tokens),
            stream: true,
            tools,
        };

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| MemoriaError::Llm(e.to_string()))?
            .error_for_status()
            .map_err(|e| MemoriaError::Llm(e.to_string()))?;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut content = String::new();
        let mut tool_calls: Vec<ToolCallPayload> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| MemoriaError::Llm(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    break;
                }
                let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) else {
                    continue;
                };
                let Some(choice) = parsed.choices.into_iter().next() else {
                    continue;
                };

                if let Some(delta) = choice.delta.content {
                    content.push_str(&delta);
                    let _ = delta_tx.send(delta).await;
                }
                for tc in choice.delta.tool_calls.unwrap_or_default() {
                    while tool_calls.len() <= tc.index {
                        tool_calls.push(ToolCallPayload {
                            id: None,
                            call_type: function_type(),
                            function: ToolCallFunction {
                                name: String::new(),
                                arguments: Value::String(String::new()),
                            },
                        });
                    }
                    let slot = &mut tool_calls[tc.index];
                    if let Some(id) = tc.id {
                        slot.id = Some(id);
                    }
                    if let Some(function) = tc.function {
                        if let Some(name) = function.name {
                            slot.function.name.push_str(&name);
                        }
                        if let Some(arguments) = function.arguments {
                            if let Value::String(acc) = &mut slot.function.arguments {
                                acc.push_str(&arguments);
                            }
                        }
                    }
                }
            }
        }

        debug!(
            "Streamed response: {} chars, {} tool calls",
            content.len(),
            tool_calls.len()
        );
        Ok(AssistantMessage {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
        })
    }
}
