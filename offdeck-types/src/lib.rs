//! Core type definitions for offdeck.
//!
//! This crate defines the storage-agnostic types shared by the sync engine:
//! - Tenant and container identifiers, and time-ordered intent ids (UUID v7)
//! - The clock abstraction and the `ServerVersion` stamp
//! - Mutation intents: operation, resource kind, lifecycle status, payload
//!
//! Presentation-specific content (slide layouts, rich text, brand kits) is
//! opaque JSON here; only the sync engine's bookkeeping is typed.

mod ids;
mod intent;
mod timestamp;

pub use ids::{ContainerId, IntentId, UserId};
pub use intent::{
    ContainerPayload, ElementPayload, IntentPayload, IntentStatus, Operation, PagePayload,
    ResourceKind,
};
pub use timestamp::{from_millis, Clock, ManualClock, ServerVersion, SystemClock};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unsupported resource: {0}")]
    UnsupportedResource(String),

    #[error("invalid {kind}: {value}")]
    InvalidEnum { kind: &'static str, value: String },
}
