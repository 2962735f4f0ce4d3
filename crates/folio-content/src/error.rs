use thiserror::Error;

use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content not found: {id}")]
    NotFound { id: String },

    #[error("no history snapshot for {id} at version {version}")]
    VersionNotFound { id: String, version: i64 },

    #[error("slug '{slug}' already exists for type '{content_type}'")]
    SlugConflict { content_type: String, slug: String },

    #[error("a '{content_type}' item already exists; only one is allowed")]
    SingletonConflict { content_type: String },

    #[error("unknown content type: {value}")]
    UnknownType { value: String },

    #[error("unknown content status: {value}")]
    UnknownStatus { value: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ContentError>;
