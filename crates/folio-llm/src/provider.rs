use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Tool definition sent to the LLM API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call extracted from the LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Tools to expose to the LLM. Empty when tool use is disabled.
    pub tools: Vec<ToolDefinition>,
    /// Raw wire-format messages for the tool loop (overrides `messages` when
    /// set). The loop needs assistant `tool_calls` turns and `tool` role
    /// results that plain string messages can't represent.
    pub raw_messages: Option<Vec<serde_json::Value>>,
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    /// Prompt + completion tokens for this round-trip.
    pub tokens_used: u32,
    pub stop_reason: String,
    /// Tool calls requested by the LLM. Empty when none were called.
    pub tool_calls: Vec<ToolCall>,
}

/// Common interface for chat-completion providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and upstream error payloads.
    fn name(&self) -> &str;

    /// Send a chat request and wait for the full response.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("circuit breaker for '{provider}' is open")]
    CircuitOpen { provider: String },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}
