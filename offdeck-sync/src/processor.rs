//! Queue processor: drains pending intents into the record store.
//!
//! A drain snapshots the PENDING intents of a scope, then applies them one
//! by one in queue order. Each intent succeeds or fails on its own; nothing
//! aborts the rest of the batch. There is no in-process backoff: an intent
//! that fails transiently goes back to PENDING and is retried the next time
//! someone calls [`QueueProcessor::drain`], until it runs out of attempts.
//! Applier and store errors all count against that ceiling. Only an intent
//! that cannot be routed at all (an undecodable payload or a kind with no
//! applier) fails on its first attempt.

use crate::applicator::{
    apply_intent, ApplyContext, ContainerApplier, ElementApplier, PageApplier, ResourceApplier,
};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use offdeck_storage::{CacheStore, Database, IntentStore, SyncIntent};
use offdeck_types::{
    Clock, ContainerId, IntentId, IntentPayload, IntentStatus, ResourceKind, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of applying one intent during a drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentOutcome {
    pub id: IntentId,
    pub success: bool,
    pub error: Option<String>,
    /// Status the intent was left in.
    pub status: IntentStatus,
    pub attempts: u32,
}

/// Aggregate result of a drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Intents that completed.
    pub processed_count: usize,
    /// Intents that reached terminal FAILED during this drain.
    pub failed_count: usize,
    /// Intents that failed but went back to PENDING for a later drain.
    pub retry_count: usize,
    /// Intents whose claim or outcome could not be written to the store.
    /// They may be left PROCESSING.
    pub stranded_count: usize,
    /// Per-intent outcomes, in processing order.
    pub results: Vec<IntentOutcome>,
    /// Whether the scoped container's cache entry was marked synced.
    pub cache_refreshed: bool,
}

/// Applies queued intents through the registered resource appliers.
pub struct QueueProcessor {
    intents: IntentStore,
    cache: CacheStore,
    appliers: HashMap<ResourceKind, Arc<dyn ResourceApplier>>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl QueueProcessor {
    /// Creates a processor with the record-store appliers for every kind.
    pub fn new(db: &Database, clock: Arc<dyn Clock>, config: SyncConfig) -> Self {
        let mut processor = Self::without_appliers(db, clock, config);
        processor.register(Arc::new(ContainerApplier::new(db)));
        processor.register(Arc::new(PageApplier::new(db)));
        processor.register(Arc::new(ElementApplier::new(db)));
        processor
    }

    /// Creates a processor with no appliers registered.
    pub fn without_appliers(db: &Database, clock: Arc<dyn Clock>, config: SyncConfig) -> Self {
        Self {
            intents: db.intents(),
            cache: db.cache(),
            appliers: HashMap::new(),
            clock,
            config,
        }
    }

    /// Registers an applier, replacing any previous one for the same kind.
    pub fn register(&mut self, applier: Arc<dyn ResourceApplier>) {
        self.appliers.insert(applier.kind(), applier);
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Drains the PENDING intents of a user, optionally narrowed to one
    /// container.
    ///
    /// Intents queued while the drain runs are left for the next call.
    /// Only failures to read the queue itself are returned as errors;
    /// per-intent failures are reported in the [`DrainReport`].
    pub fn drain(&self, user: &UserId, container: Option<&ContainerId>) -> SyncResult<DrainReport> {
        let snapshot = self.intents.list_pending(user, container)?;
        if snapshot.is_empty() {
            debug!("Nothing to drain for {}", user);
            return Ok(DrainReport::default());
        }

        info!("Draining {} intents for {}", snapshot.len(), user);
        let mut report = DrainReport::default();

        for intent in &snapshot {
            match self.intents.claim(&intent.id) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Intent {} claimed by another drain, skipping", intent.id);
                    continue;
                }
                Err(e) => {
                    warn!("Failed to claim intent {}: {}", intent.id, e);
                    report.stranded_count += 1;
                    report.results.push(IntentOutcome {
                        id: intent.id,
                        success: false,
                        error: Some(e.to_string()),
                        status: intent.status,
                        attempts: intent.attempts,
                    });
                    continue;
                }
            }

            let outcome = match self.route(intent) {
                Err(e) => {
                    warn!("Intent {} rejected: {}", intent.id, e);
                    self.finish_failure(intent, &e, 1)
                }
                Ok((payload, applier)) => match self.apply(intent, &payload, applier.as_ref()) {
                    Ok(()) => self.finish_success(intent),
                    Err(e) => {
                        warn!("Intent {} failed: {}", intent.id, e);
                        self.finish_failure(intent, &e, self.config.max_attempts)
                    }
                },
            };

            match (outcome.success, outcome.status) {
                (true, _) => report.processed_count += 1,
                (false, IntentStatus::Failed) => report.failed_count += 1,
                (false, IntentStatus::Pending) => report.retry_count += 1,
                (false, _) => report.stranded_count += 1,
            }
            report.results.push(outcome);
        }

        if let Some(container) = container {
            report.cache_refreshed = self.refresh_cache(user, container, &report);
        }

        info!(
            "Drain for {} done: {} processed, {} failed, {} to retry, {} stranded",
            user,
            report.processed_count,
            report.failed_count,
            report.retry_count,
            report.stranded_count
        );
        Ok(report)
    }

    /// Decodes the payload and finds its applier. Errors here cannot be
    /// fixed by retrying.
    fn route(&self, intent: &SyncIntent) -> SyncResult<(IntentPayload, Arc<dyn ResourceApplier>)> {
        let payload = intent.decode_payload()?;
        let applier = self.appliers.get(&payload.kind()).cloned().ok_or_else(|| {
            SyncError::UnsupportedResource(format!("no applier registered for {}", payload.kind()))
        })?;
        Ok((payload, applier))
    }

    fn apply(
        &self,
        intent: &SyncIntent,
        payload: &IntentPayload,
        applier: &dyn ResourceApplier,
    ) -> SyncResult<()> {
        let ctx = ApplyContext {
            user_id: &intent.user_id,
            now: self.clock.now(),
        };
        apply_intent(applier, &ctx, intent.operation, payload)
    }

    fn finish_success(&self, intent: &SyncIntent) -> IntentOutcome {
        match self.intents.complete(&intent.id, self.clock.now()) {
            Ok(()) => {
                debug!("Intent {} completed", intent.id);
                IntentOutcome {
                    id: intent.id,
                    success: true,
                    error: None,
                    status: IntentStatus::Completed,
                    attempts: intent.attempts,
                }
            }
            Err(e) => {
                warn!("Intent {} applied but could not be marked completed: {}", intent.id, e);
                IntentOutcome {
                    id: intent.id,
                    success: false,
                    error: Some(e.to_string()),
                    status: IntentStatus::Processing,
                    attempts: intent.attempts,
                }
            }
        }
    }

    fn finish_failure(&self, intent: &SyncIntent, error: &SyncError, ceiling: u32) -> IntentOutcome {
        let message = error.to_string();
        let (status, attempts) = match self.intents.record_failure(
            &intent.id,
            &message,
            ceiling,
            self.clock.now(),
        ) {
            Ok(result) => result,
            Err(e) => {
                warn!("Failed to record failure of intent {}: {}", intent.id, e);
                (IntentStatus::Processing, intent.attempts)
            }
        };

        if status == IntentStatus::Failed {
            warn!("Intent {} failed permanently after {} attempts", intent.id, attempts);
        }

        IntentOutcome {
            id: intent.id,
            success: false,
            error: Some(message),
            status,
            attempts,
        }
    }

    /// Marks the container's cache entry synced when nothing in this drain
    /// failed terminally or was stranded (and, if so configured, nothing is
    /// awaiting retry).
    fn refresh_cache(&self, user: &UserId, container: &ContainerId, report: &DrainReport) -> bool {
        if report.failed_count > 0 {
            debug!("Not refreshing cache for {}/{}: terminal failures", user, container);
            return false;
        }
        if report.stranded_count > 0 {
            debug!("Not refreshing cache for {}/{}: unrecorded outcomes", user, container);
            return false;
        }
        if report.retry_count > 0 && !self.config.refresh_cache_with_pending_retries {
            debug!("Not refreshing cache for {}/{}: intents awaiting retry", user, container);
            return false;
        }
        match self.cache.mark_synced(user, container, self.clock.now()) {
            Ok(true) => true,
            Ok(false) => {
                debug!("No cache entry for {}/{} to refresh", user, container);
                false
            }
            Err(e) => {
                warn!("Failed to refresh cache for {}/{}: {}", user, container, e);
                false
            }
        }
    }
}
