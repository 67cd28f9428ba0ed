//! Sync engine: wires every component onto one database and clock.
//!
//! The components are also usable on their own; the engine only saves
//! callers from constructing each with the same handles.

use crate::cache::OfflineCache;
use crate::config::SyncConfig;
use crate::conflict::ConflictResolver;
use crate::error::{SyncError, SyncResult};
use crate::maintenance::MaintenanceJobs;
use crate::processor::{DrainReport, QueueProcessor};
use crate::queue::SyncQueue;
use crate::scheduler::{MaintenanceScheduler, SchedulerHandle};
use offdeck_storage::Database;
use offdeck_types::{Clock, ContainerId, SystemClock, UserId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The offline sync engine.
#[derive(Clone)]
pub struct SyncEngine {
    config: SyncConfig,
    cache: OfflineCache,
    queue: SyncQueue,
    processor: Arc<QueueProcessor>,
    conflicts: ConflictResolver,
    maintenance: Arc<MaintenanceJobs>,
}

impl SyncEngine {
    /// Creates an engine reading time from the system clock.
    pub fn new(db: &Database, config: SyncConfig) -> SyncResult<Self> {
        Self::with_clock(db, config, Arc::new(SystemClock))
    }

    /// Creates an engine with an injected clock.
    pub fn with_clock(db: &Database, config: SyncConfig, clock: Arc<dyn Clock>) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self::with_processor(
            db,
            config.clone(),
            Arc::clone(&clock),
            QueueProcessor::new(db, clock, config),
        ))
    }

    /// Creates an engine around a processor with custom appliers.
    pub fn with_processor(
        db: &Database,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
        processor: QueueProcessor,
    ) -> Self {
        info!("Sync engine ready (max attempts {})", config.max_attempts);
        Self {
            cache: OfflineCache::new(db, Arc::clone(&clock)),
            queue: SyncQueue::new(db, Arc::clone(&clock)),
            processor: Arc::new(processor),
            conflicts: ConflictResolver::new(db, Arc::clone(&clock)),
            maintenance: Arc::new(MaintenanceJobs::new(db, clock, config.clone())),
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn cache(&self) -> &OfflineCache {
        &self.cache
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn processor(&self) -> &QueueProcessor {
        &self.processor
    }

    pub fn conflicts(&self) -> &ConflictResolver {
        &self.conflicts
    }

    pub fn maintenance(&self) -> &MaintenanceJobs {
        &self.maintenance
    }

    /// Drains on the blocking pool, giving up waiting after `limit`.
    ///
    /// A drain that times out keeps running in the background: intents it
    /// already claimed finish normally, and the rest stay PENDING.
    pub async fn drain_with_timeout(
        &self,
        user: UserId,
        container: Option<ContainerId>,
        limit: Duration,
    ) -> SyncResult<DrainReport> {
        let processor = Arc::clone(&self.processor);
        let task =
            tokio::task::spawn_blocking(move || processor.drain(&user, container.as_ref()));
        match tokio::time::timeout(limit, task).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => Err(SyncError::Task(e.to_string())),
            Err(_) => {
                warn!("Drain did not finish within {:?}", limit);
                Err(SyncError::Timeout(limit))
            }
        }
    }

    /// Starts the periodic maintenance sweeps. Must be called inside a
    /// tokio runtime.
    pub fn start_maintenance(&self) -> SchedulerHandle {
        MaintenanceScheduler::for_jobs(Arc::clone(&self.maintenance)).start()
    }
}
