use thiserror::Error;

#[derive(Debug, Error)]
pub enum FolioError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FolioError {
    /// Short error code string for logs and client payloads.
    pub fn code(&self) -> &'static str {
        match self {
            FolioError::Config(_) => "CONFIG_ERROR",
            FolioError::Database(_) => "DATABASE_ERROR",
            FolioError::Cache(_) => "CACHE_ERROR",
            FolioError::Serialization(_) => "SERIALIZATION_ERROR",
            FolioError::Io(_) => "IO_ERROR",
            FolioError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, FolioError>;
