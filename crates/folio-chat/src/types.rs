use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
            SessionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "active" => SessionStatus::Active,
            "ended" => SessionStatus::Ended,
            _ => SessionStatus::Expired,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::System,
        }
    }
}

/// A visitor's conversation. Sessions expire 24 hours after creation and are
/// swept lazily on lookup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub visitor_id: String,
    /// Salted hash of the client address; used only for rate limiting and
    /// session lookup, never echoed to clients.
    #[serde(skip_serializing)]
    pub ip_hash: String,
    pub user_agent: Option<String>,
    pub message_count: i64,
    pub status: SessionStatus,
    pub created_at: String,
    pub last_active_at: String,
    pub expires_at: String,
}

/// One persisted chat message. Content is stored raw — obfuscation applies
/// only to the outbound prompt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub tokens_used: Option<i64>,
    pub model: Option<String>,
    pub created_at: String,
}

/// Input to the chat operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub visitor_id: String,
    pub ip_hash: String,
    pub user_agent: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Response envelope for one chat round-trip.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub session_id: String,
    pub message: ReplyMessage,
    pub tokens_used: u32,
}
