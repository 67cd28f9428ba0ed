//! Sync queue: the append-only log of mutations made while offline.
//!
//! Priority is assigned here, never by callers: deletes first, then
//! creates, then updates. Within a batch, each item's position is added to
//! its base priority so the submission order survives among equal kinds.

use crate::error::{SyncError, SyncResult};
use offdeck_storage::{Database, IntentStore, StatusCounts, SyncIntent};
use offdeck_types::{Clock, ContainerId, IntentId, IntentPayload, Operation, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// One entry of an `enqueue_batch` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub container_id: ContainerId,
    pub operation: Operation,
    pub payload: IntentPayload,
}

/// Producer side of the intent log.
#[derive(Clone)]
pub struct SyncQueue {
    store: IntentStore,
    clock: Arc<dyn Clock>,
}

impl SyncQueue {
    pub fn new(db: &Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: db.intents(),
            clock,
        }
    }

    /// Queues a single intent.
    pub fn enqueue(
        &self,
        user: &UserId,
        container: &ContainerId,
        operation: Operation,
        payload: IntentPayload,
    ) -> SyncResult<SyncIntent> {
        check_scope(container, &payload)?;
        let intent = SyncIntent::new(
            user.clone(),
            container.clone(),
            operation,
            &payload,
            operation.base_priority(),
            self.clock.now(),
        )?;
        self.store.insert(&intent)?;
        debug!(
            "Queued {} {} {} for {}/{} (priority {})",
            operation,
            payload.kind(),
            payload.target_id(),
            user,
            container,
            intent.priority
        );
        Ok(intent)
    }

    /// Queues several intents atomically. Returns how many were queued.
    pub fn enqueue_batch(&self, user: &UserId, items: Vec<BatchItem>) -> SyncResult<usize> {
        let now = self.clock.now();
        let intents = items
            .into_iter()
            .enumerate()
            .map(|(position, item)| -> SyncResult<SyncIntent> {
                check_scope(&item.container_id, &item.payload)?;
                let priority = item.operation.base_priority() + position as i64;
                Ok(SyncIntent::new(
                    user.clone(),
                    item.container_id,
                    item.operation,
                    &item.payload,
                    priority,
                    now,
                )?)
            })
            .collect::<SyncResult<Vec<_>>>()?;

        let count = self.store.insert_many(&intents)?;
        info!("Queued batch of {} intents for {}", count, user);
        Ok(count)
    }

    /// PENDING intents in drain order.
    pub fn list_pending(
        &self,
        user: &UserId,
        container: Option<&ContainerId>,
    ) -> SyncResult<Vec<SyncIntent>> {
        Ok(self.store.list_pending(user, container)?)
    }

    /// Loads one intent, or `NotFound`.
    pub fn get(&self, id: &IntentId) -> SyncResult<SyncIntent> {
        self.store
            .get(id)?
            .ok_or_else(|| SyncError::NotFound(format!("intent {id}")))
    }

    /// Intent counts per status for a user.
    pub fn stats(&self, user: &UserId) -> SyncResult<StatusCounts> {
        Ok(self.store.counts(user)?)
    }
}

/// Container and page payloads must belong to the container they are
/// queued under. Elements only name their page, so they are not checked.
fn check_scope(container: &ContainerId, payload: &IntentPayload) -> SyncResult<()> {
    let owner = match payload {
        IntentPayload::Container(p) => &p.id,
        IntentPayload::Page(p) => &p.container_id,
        IntentPayload::Element(_) => return Ok(()),
    };
    if owner != container.as_str() {
        return Err(SyncError::Validation(format!(
            "{} {} belongs to container {owner}, not {container}",
            payload.kind(),
            payload.target_id()
        )));
    }
    Ok(())
}
