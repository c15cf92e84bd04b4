//! Memoria - a local assistant with persistent memory
//!
//! A conversational agent that remembers the user across sessions:
//! - Bounded core memory always loaded at conversation start
//! - A markdown context tree for deeper, topic-organized knowledge
//! - An append-only observation log the agent keeps about the user
//! - End-of-session consolidation driven by an agentic tool loop

pub mod agent;
pub mod consolidation;
pub mod llm;
pub mod prompts;
pub mod store;
pub mod tools;
pub mod vault;

pub use agent::{run_agent_loop, truncate_messages, AgentLoopOutcome};
pub use llm::{ChatMessage, LlmClient, Role};
pub use store::MemoryStore;

use std::path::PathBuf;

/// Default token ceiling for core memory.
pub const CORE_MEMORY_MAX_TOKENS: usize = 500;

/// Configuration for Memoria
#[derive(Debug, Clone)]
pub struct MemoriaConfig {
    /// Root of the markdown vault. Must exist and be a directory; the
    /// memory structure is created inside it.
    pub vault_path: PathBuf,

    /// Base URL of the OpenAI-compatible chat completions endpoint.
    pub base_url: String,

    /// Model name sent with each request.
    pub model: String,

    /// Token ceiling for core memory.
    pub core_memory_max_tokens: usize,

    /// Active observation count above which consolidation triggers.
    pub observation_max_active: usize,

    /// Observation file token estimate above which consolidation triggers.
    pub observation_max_tokens: usize,

    /// Number of most recent observation entries kept verbatim at consolidation.
    pub observation_keep_recent: usize,
}

impl MemoriaConfig {
    pub fn new(vault_path: PathBuf) -> Self {
        Self {
            vault_path,
            base_url: "http://localhost:1234/v1".to_string(),
            model: "local-model".to_string(),
            core_memory_max_tokens: CORE_MEMORY_MAX_TOKENS,
            observation_max_active: 20,
            observation_max_tokens: 800,
            observation_keep_recent: 10,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_core_memory_max_tokens(mut self, tokens: usize) -> Self {
        self.core_memory_max_tokens = tokens;
        self
    }
}

/// Result type for Memoria operations
pub type Result<T> = std::result::Result<T, MemoriaError>;

/// Errors that can occur in Memoria
#[derive(Debug, thiserror::Error)]
pub enum MemoriaError {
    /// The vault root is missing or not a directory. All memory operations
    /// short-circuit to this before touching disk.
    #[error("Memory not configured: {0}")]
    NotConfigured(String),

    /// A store rule was violated (bad path, oversized content, malformed
    /// append, double resolve). The message names the offending rule.
    #[error("{0}")]
    Validation(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MemoriaError {
    /// Render as the short `Error: ...` string fed back to the model
    /// through the tool surface.
    pub fn to_tool_result(&self) -> String {
        format!("Error: {}", self)
    }
}

/// Estimate the token count of a string (~4 characters per token, rounded up).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
