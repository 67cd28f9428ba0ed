//! SQLite storage layer for offdeck.
//!
//! Provides the durable store the sync engine runs against:
//!
//! - `records`: containers, pages and elements as JSON documents
//! - `offline_cache`: one snapshot per (user, container)
//! - `sync_intents`: the ordered log of queued mutations
//!
//! All three tables live in one database so a single connection serializes
//! every write. Timestamps are stored as Unix milliseconds.

mod cache_store;
mod error;
mod intent_store;
mod record_store;

pub use cache_store::{CacheEntry, CacheStore, CacheSummary};
pub use error::{StorageError, StorageResult};
pub use intent_store::{IntentStore, StatusCounts, SyncIntent};
pub use record_store::{Record, RecordStore};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS records (
        kind TEXT NOT NULL,
        id TEXT NOT NULL,
        parent_id TEXT,
        owner_id TEXT NOT NULL,
        data TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (kind, id)
    );

    CREATE TABLE IF NOT EXISTS offline_cache (
        user_id TEXT NOT NULL,
        container_id TEXT NOT NULL,
        data TEXT NOT NULL,
        version INTEGER NOT NULL,
        last_synced INTEGER NOT NULL,
        pending_sync INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, container_id)
    );

    CREATE TABLE IF NOT EXISTS sync_intents (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL,
        container_id TEXT NOT NULL,
        operation TEXT NOT NULL,
        payload TEXT NOT NULL,
        priority INTEGER NOT NULL,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        created_at INTEGER NOT NULL,
        processed_at INTEGER
    );

    CREATE INDEX IF NOT EXISTS idx_records_parent
        ON records (kind, parent_id, created_at);

    CREATE INDEX IF NOT EXISTS idx_sync_intents_drain
        ON sync_intents (user_id, status, priority, created_at, seq);
    CREATE INDEX IF NOT EXISTS idx_sync_intents_status
        ON sync_intents (status, created_at);
";

/// Shared handle to the offdeck database.
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        debug!("Opened offdeck database at {}", path.display());
        Self::from_connection(conn)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Record table view.
    pub fn records(&self) -> RecordStore {
        RecordStore::new(self.clone())
    }

    /// Offline cache table view.
    pub fn cache(&self) -> CacheStore {
        CacheStore::new(self.clone())
    }

    /// Sync intent table view.
    pub fn intents(&self) -> IntentStore {
        IntentStore::new(self.clone())
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&conn)
    }

    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

pub(crate) fn millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
    offdeck_types::from_millis(millis)
        .ok_or_else(|| StorageError::InvalidData(format!("timestamp out of range: {millis}")))
}

pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
