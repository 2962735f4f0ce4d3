pub mod db;
pub mod error;
pub mod repository;
pub mod types;
pub mod validate;

pub use error::{ContentError, Result};
pub use repository::ContentRepository;
pub use types::{
    Bundle, ChangeType, ContentItem, ContentStatus, ContentType, CreateContent, HistoryEntry,
    ListQuery, UpdateContent,
};
pub use validate::{validate_content_data, validate_slug, ValidationError};
