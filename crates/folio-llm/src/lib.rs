pub mod breaker;
pub mod openai;
pub mod provider;
pub mod retry;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use openai::OpenAiClient;
pub use provider::{
    ChatRequest, ChatResponse, LlmError, LlmProvider, Message, Role, ToolCall, ToolDefinition,
};
pub use retry::{is_retryable_error, with_retry, RetryPolicy};
