//! Offline cache: the last synchronized snapshot of each container a user
//! has opened, plus a dirty flag for unsynced local edits.

use crate::error::{SyncError, SyncResult};
use offdeck_storage::{CacheEntry, CacheStore, CacheSummary, Database};
use offdeck_types::{Clock, ContainerId, UserId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per (user, container) snapshot store.
#[derive(Clone)]
pub struct OfflineCache {
    store: CacheStore,
    clock: Arc<dyn Clock>,
}

impl OfflineCache {
    pub fn new(db: &Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: db.cache(),
            clock,
        }
    }

    /// Returns the entry, or `NotFound`.
    pub fn get(&self, user: &UserId, container: &ContainerId) -> SyncResult<CacheEntry> {
        self.store
            .get(user, container)?
            .ok_or_else(|| not_found(user, container))
    }

    /// Upserts the snapshot. Always leaves the entry clean (`pending_sync`
    /// false) with `last_synced` set to now.
    pub fn put(
        &self,
        user: &UserId,
        container: &ContainerId,
        data: &serde_json::Value,
        version: i64,
    ) -> SyncResult<CacheEntry> {
        if let Some(existing) = self.store.get(user, container)? {
            if existing.version > version {
                warn!(
                    "Cache version for {}/{} going backwards: {} -> {}",
                    user, container, existing.version, version
                );
            }
        }
        let entry = self
            .store
            .upsert(user, container, data, version, self.clock.now())?;
        debug!("Cached {}/{} at version {}", user, container, version);
        Ok(entry)
    }

    /// Flags unsynced local edits without touching the snapshot.
    pub fn mark_pending_sync(&self, user: &UserId, container: &ContainerId) -> SyncResult<()> {
        if !self.store.mark_pending(user, container)? {
            return Err(not_found(user, container));
        }
        Ok(())
    }

    /// Clears the dirty flag after a clean drain. Returns false when the
    /// user has no entry for the container.
    pub fn mark_synced(&self, user: &UserId, container: &ContainerId) -> SyncResult<bool> {
        Ok(self.store.mark_synced(user, container, self.clock.now())?)
    }

    /// Deletes the entry.
    ///
    /// Clearing an absent entry is an error so that double clears surface.
    pub fn clear(&self, user: &UserId, container: &ContainerId) -> SyncResult<()> {
        if !self.store.delete(user, container)? {
            return Err(not_found(user, container));
        }
        debug!("Cleared cache for {}/{}", user, container);
        Ok(())
    }

    /// Summaries of every cached container for a user.
    pub fn list_for_user(&self, user: &UserId) -> SyncResult<Vec<CacheSummary>> {
        Ok(self.store.list_for_user(user)?)
    }
}

fn not_found(user: &UserId, container: &ContainerId) -> SyncError {
    SyncError::NotFound(format!("cache entry {user}/{container}"))
}
