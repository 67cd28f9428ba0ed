//! Error types for the sync layer.

use offdeck_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Durable store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cache entry, intent or record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request is malformed; retrying will not help.
    #[error("validation error: {0}")]
    Validation(String),

    /// A write failed in a way that may succeed on a later attempt.
    #[error("transient apply error: {0}")]
    Transient(String),

    /// The payload names a resource kind nothing can apply.
    #[error("unsupported resource: {0}")]
    UnsupportedResource(String),

    /// `resolve` was called with an unresolved MANUAL report.
    #[error("conflict requires manual resolution")]
    ManualResolutionRequired,

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A drain did not finish within its time limit.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A background task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(String),
}

impl From<offdeck_types::Error> for SyncError {
    fn from(e: offdeck_types::Error) -> Self {
        match e {
            offdeck_types::Error::UnsupportedResource(kind) => SyncError::UnsupportedResource(kind),
            other => SyncError::Validation(other.to_string()),
        }
    }
}
