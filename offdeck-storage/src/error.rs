//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A row with the same key already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A stored value could not be interpreted.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Another thread panicked while holding the connection.
    #[error("connection lock poisoned")]
    LockPoisoned,
}

impl From<offdeck_types::Error> for StorageError {
    fn from(e: offdeck_types::Error) -> Self {
        StorageError::InvalidData(e.to_string())
    }
}
