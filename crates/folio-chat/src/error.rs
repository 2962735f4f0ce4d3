use thiserror::Error;

use folio_llm::LlmError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("chat session not found: {id}")]
    SessionNotFound { id: String },

    #[error("chat request deadline of {ms}ms exceeded")]
    DeadlineExceeded { ms: u64 },

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;
