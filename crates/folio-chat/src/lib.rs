pub mod db;
pub mod error;
pub mod orchestrator;
pub mod store;
pub mod types;

pub use error::{ChatError, Result};
pub use orchestrator::ChatOrchestrator;
pub use store::ChatStore;
pub use types::{ChatReply, ChatRequest, ChatSession, MessageRole, SessionStatus, StoredMessage};
