//! Per (user, container) offline snapshots.

use crate::{millis, timestamp, Database, StorageResult};
use chrono::{DateTime, Utc};
use offdeck_types::{ContainerId, UserId};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Last synchronized snapshot of a container, held for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub user_id: UserId,
    pub container_id: ContainerId,
    /// Snapshot of the container and its nested pages/elements.
    pub data: serde_json::Value,
    /// Caller-supplied monotonic version stamp.
    pub version: i64,
    pub last_synced: DateTime<Utc>,
    /// True while local edits exist that are not yet durably committed.
    pub pending_sync: bool,
}

/// Cache listing row; everything but the snapshot itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSummary {
    pub container_id: ContainerId,
    pub version: i64,
    pub last_synced: DateTime<Utc>,
    pub pending_sync: bool,
}

/// The `offline_cache` table.
#[derive(Clone)]
pub struct CacheStore {
    db: Database,
}

impl CacheStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Loads the entry for (user, container), if present.
    pub fn get(&self, user: &UserId, container: &ContainerId) -> StorageResult<Option<CacheEntry>> {
        let raw = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT data, version, last_synced, pending_sync FROM offline_cache
                     WHERE user_id = ?1 AND container_id = ?2",
                    params![user.as_str(), container.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, bool>(3)?,
                        ))
                    },
                )
                .optional()?)
        })?;

        match raw {
            Some((data, version, last_synced, pending_sync)) => Ok(Some(CacheEntry {
                user_id: user.clone(),
                container_id: container.clone(),
                data: serde_json::from_str(&data)?,
                version,
                last_synced: timestamp(last_synced)?,
                pending_sync,
            })),
            None => Ok(None),
        }
    }

    /// Inserts or replaces the entry, clearing `pending_sync`.
    pub fn upsert(
        &self,
        user: &UserId,
        container: &ContainerId,
        data: &serde_json::Value,
        version: i64,
        now: DateTime<Utc>,
    ) -> StorageResult<CacheEntry> {
        let json = serde_json::to_string(data)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO offline_cache (user_id, container_id, data, version, last_synced, pending_sync)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)
                 ON CONFLICT (user_id, container_id) DO UPDATE SET
                     data = excluded.data,
                     version = excluded.version,
                     last_synced = excluded.last_synced,
                     pending_sync = 0",
                params![user.as_str(), container.as_str(), json, version, millis(now)],
            )?;
            Ok(())
        })?;

        Ok(CacheEntry {
            user_id: user.clone(),
            container_id: container.clone(),
            data: data.clone(),
            version,
            last_synced: now,
            pending_sync: false,
        })
    }

    /// Sets `pending_sync`. Returns false if no entry exists.
    pub fn mark_pending(&self, user: &UserId, container: &ContainerId) -> StorageResult<bool> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE offline_cache SET pending_sync = 1 WHERE user_id = ?1 AND container_id = ?2",
                params![user.as_str(), container.as_str()],
            )?)
        })?;
        Ok(changed > 0)
    }

    /// Clears `pending_sync` and stamps `last_synced`. Returns false if no entry exists.
    pub fn mark_synced(
        &self,
        user: &UserId,
        container: &ContainerId,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE offline_cache SET pending_sync = 0, last_synced = ?1
                 WHERE user_id = ?2 AND container_id = ?3",
                params![millis(now), user.as_str(), container.as_str()],
            )?)
        })?;
        Ok(changed > 0)
    }

    /// Deletes the entry. Returns false if no entry existed.
    pub fn delete(&self, user: &UserId, container: &ContainerId) -> StorageResult<bool> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM offline_cache WHERE user_id = ?1 AND container_id = ?2",
                params![user.as_str(), container.as_str()],
            )?)
        })?;
        Ok(changed > 0)
    }

    /// Lists all entries for a user, ordered by container id.
    pub fn list_for_user(&self, user: &UserId) -> StorageResult<Vec<CacheSummary>> {
        let raws = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT container_id, version, last_synced, pending_sync FROM offline_cache
                 WHERE user_id = ?1 ORDER BY container_id ASC",
            )?;
            let rows = stmt.query_map(params![user.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;

        raws.into_iter()
            .map(|(container_id, version, last_synced, pending_sync)| {
                Ok(CacheSummary {
                    container_id: ContainerId::new(container_id),
                    version,
                    last_synced: timestamp(last_synced)?,
                    pending_sync,
                })
            })
            .collect()
    }
}
