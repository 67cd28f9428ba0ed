//! Offline synchronization for offdeck.
//!
//! Lets a client keep working on containers, pages and elements while
//! disconnected, then reconcile with the server once it comes back.
//!
//! # Components
//!
//! - **Offline cache**: last synchronized snapshot per (user, container),
//!   with a dirty flag for unsynced local edits
//! - **Sync queue**: durable log of mutation intents, ordered deletes first,
//!   then creates, then updates
//! - **Queue processor**: drains pending intents through one
//!   [`ResourceApplier`] per resource kind, with bounded retries
//! - **Conflict resolver**: three-way field comparison between the cached
//!   baseline, the client's document and the server's current one
//! - **Maintenance**: purges old completed intents and re-arms recent
//!   failures on a schedule
//!
//! # Example
//!
//! ```
//! use offdeck_sync::{Database, SyncConfig, SyncEngine};
//! use offdeck_types::{ContainerId, ContainerPayload, IntentPayload, Operation, UserId};
//!
//! let db = Database::open_in_memory().unwrap();
//! let engine = SyncEngine::new(&db, SyncConfig::default()).unwrap();
//!
//! let user = UserId::new("alice");
//! let container = ContainerId::new("c1");
//! let payload = IntentPayload::Container(ContainerPayload {
//!     id: "c1".into(),
//!     data: serde_json::json!({ "title": "Roadmap" }),
//! });
//! engine
//!     .queue()
//!     .enqueue(&user, &container, Operation::Create, payload)
//!     .unwrap();
//!
//! let report = engine.processor().drain(&user, Some(&container)).unwrap();
//! assert_eq!(report.processed_count, 1);
//! ```

pub mod applicator;
mod cache;
mod config;
pub mod conflict;
mod engine;
mod error;
mod maintenance;
mod processor;
mod queue;
pub mod scheduler;

pub use applicator::{
    apply_intent, ApplyContext, ContainerApplier, ElementApplier, PageApplier, ResourceApplier,
};
pub use cache::OfflineCache;
pub use config::SyncConfig;
pub use conflict::{
    ConflictReport, ConflictResolver, ConflictStrategy, CONFLICT_FIELDS, IDENTITY_FIELDS,
};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use maintenance::{MaintenanceJobs, SweepReport};
pub use processor::{DrainReport, IntentOutcome, QueueProcessor};
pub use queue::{BatchItem, SyncQueue};
pub use scheduler::{MaintenanceScheduler, SchedulerHandle};

pub use offdeck_storage::{CacheEntry, CacheSummary, Database, StatusCounts, SyncIntent};
