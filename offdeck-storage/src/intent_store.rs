//! The ordered log of queued mutation intents.
//!
//! Rows are never rewritten wholesale: every status change is a guarded
//! `UPDATE ... WHERE status = ?` so that a transition only happens from the
//! state the caller expects.

use crate::{millis, timestamp, Database, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use offdeck_types::{
    ContainerId, IntentId, IntentPayload, IntentStatus, Operation, UserId,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// A queued mutation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncIntent {
    pub id: IntentId,
    pub user_id: UserId,
    pub container_id: ContainerId,
    pub operation: Operation,
    /// Stored payload, tagged by resource kind. Kept undecoded so that a
    /// row with an unknown kind can still be listed and failed explicitly.
    pub payload: serde_json::Value,
    pub priority: i64,
    pub status: IntentStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl SyncIntent {
    /// Builds a fresh PENDING intent.
    pub fn new(
        user_id: UserId,
        container_id: ContainerId,
        operation: Operation,
        payload: &IntentPayload,
        priority: i64,
        created_at: DateTime<Utc>,
    ) -> StorageResult<Self> {
        Ok(Self {
            id: IntentId::new(),
            user_id,
            container_id,
            operation,
            payload: serde_json::to_value(payload)?,
            priority,
            status: IntentStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at,
            processed_at: None,
        })
    }

    /// Decodes the typed payload.
    pub fn decode_payload(&self) -> offdeck_types::Result<IntentPayload> {
        IntentPayload::from_value(self.payload.clone())
    }
}

/// Number of intents in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

const COLUMNS: &str = "id, user_id, container_id, operation, payload, priority, status, \
                       attempts, last_error, created_at, processed_at";

type RawIntent = (
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    u32,
    Option<String>,
    i64,
    Option<i64>,
);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawIntent> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn decode(raw: RawIntent) -> StorageResult<SyncIntent> {
    let (
        id,
        user_id,
        container_id,
        operation,
        payload,
        priority,
        status,
        attempts,
        last_error,
        created_at,
        processed_at,
    ) = raw;
    Ok(SyncIntent {
        id: IntentId::parse(&id)
            .map_err(|e| StorageError::InvalidData(format!("intent id {id}: {e}")))?,
        user_id: UserId::new(user_id),
        container_id: ContainerId::new(container_id),
        operation: operation.parse()?,
        payload: serde_json::from_str(&payload)?,
        priority,
        status: status.parse()?,
        attempts,
        last_error,
        created_at: timestamp(created_at)?,
        processed_at: processed_at.map(timestamp).transpose()?,
    })
}

fn insert_row(conn: &Connection, intent: &SyncIntent) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO sync_intents (id, user_id, container_id, operation, payload, priority,
                                   status, attempts, last_error, created_at, processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            intent.id.to_string(),
            intent.user_id.as_str(),
            intent.container_id.as_str(),
            intent.operation.as_str(),
            serde_json::to_string(&intent.payload)?,
            intent.priority,
            intent.status.as_str(),
            intent.attempts,
            intent.last_error,
            millis(intent.created_at),
            intent.processed_at.map(millis),
        ],
    )?;
    Ok(())
}

/// The `sync_intents` table.
#[derive(Clone)]
pub struct IntentStore {
    db: Database,
}

impl IntentStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Appends one intent to the log.
    pub fn insert(&self, intent: &SyncIntent) -> StorageResult<()> {
        self.db.with_conn(|conn| insert_row(conn, intent))
    }

    /// Appends several intents in one transaction; either all land or none.
    pub fn insert_many(&self, intents: &[SyncIntent]) -> StorageResult<usize> {
        self.db.with_tx(|tx| {
            for intent in intents {
                insert_row(tx, intent)?;
            }
            Ok(intents.len())
        })
    }

    /// Loads one intent by id.
    pub fn get(&self, id: &IntentId) -> StorageResult<Option<SyncIntent>> {
        let raw = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM sync_intents WHERE id = ?1"),
                    params![id.to_string()],
                    read_row,
                )
                .optional()?)
        })?;
        raw.map(decode).transpose()
    }

    /// PENDING intents for a user, optionally narrowed to one container,
    /// in drain order: priority, then creation time, then insertion order.
    pub fn list_pending(
        &self,
        user: &UserId,
        container: Option<&ContainerId>,
    ) -> StorageResult<Vec<SyncIntent>> {
        let raws = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM sync_intents
                 WHERE user_id = ?1 AND status = 'PENDING'
                   AND (?2 IS NULL OR container_id = ?2)
                 ORDER BY priority ASC, created_at ASC, seq ASC"
            ))?;
            let rows = stmt.query_map(
                params![user.as_str(), container.map(|c| c.as_str())],
                read_row,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;
        raws.into_iter().map(decode).collect()
    }

    /// Moves an intent from PENDING to PROCESSING.
    ///
    /// Returns false if the intent is no longer PENDING, i.e. some other
    /// drain already claimed it.
    pub fn claim(&self, id: &IntentId) -> StorageResult<bool> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE sync_intents SET status = 'PROCESSING'
                 WHERE id = ?1 AND status = 'PENDING'",
                params![id.to_string()],
            )?)
        })?;
        Ok(changed > 0)
    }

    /// Moves a PROCESSING intent to COMPLETED.
    pub fn complete(&self, id: &IntentId, now: DateTime<Utc>) -> StorageResult<()> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE sync_intents SET status = 'COMPLETED', processed_at = ?1, last_error = NULL
                 WHERE id = ?2 AND status = 'PROCESSING'",
                params![millis(now), id.to_string()],
            )?)
        })?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("processing intent {id}")));
        }
        Ok(())
    }

    /// Records a failed attempt on a PROCESSING intent.
    ///
    /// Increments `attempts`; the intent goes back to PENDING while
    /// `attempts < max_attempts` and to FAILED once the ceiling is reached.
    /// Returns the resulting status and attempt count.
    pub fn record_failure(
        &self,
        id: &IntentId,
        error: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> StorageResult<(IntentStatus, u32)> {
        self.db.with_tx(|tx| {
            let attempts: Option<u32> = tx
                .query_row(
                    "SELECT attempts FROM sync_intents WHERE id = ?1 AND status = 'PROCESSING'",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            let attempts = attempts
                .ok_or_else(|| StorageError::NotFound(format!("processing intent {id}")))?
                .saturating_add(1);

            let (status, processed_at) = if attempts >= max_attempts {
                (IntentStatus::Failed, Some(millis(now)))
            } else {
                (IntentStatus::Pending, None)
            };

            tx.execute(
                "UPDATE sync_intents
                 SET status = ?1, attempts = ?2, last_error = ?3, processed_at = ?4
                 WHERE id = ?5",
                params![status.as_str(), attempts, error, processed_at, id.to_string()],
            )?;
            Ok((status, attempts))
        })
    }

    /// Intent counts per status for one user.
    pub fn counts(&self, user: &UserId) -> StorageResult<StatusCounts> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM sync_intents WHERE user_id = ?1 GROUP BY status",
            )?;
            let rows = stmt.query_map(params![user.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            let n = n as usize;
            match status.parse::<IntentStatus>()? {
                IntentStatus::Pending => counts.pending = n,
                IntentStatus::Processing => counts.processing = n,
                IntentStatus::Completed => counts.completed = n,
                IntentStatus::Failed => counts.failed = n,
            }
        }
        Ok(counts)
    }

    /// Ids of COMPLETED intents processed before `cutoff`.
    pub fn completed_before(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<IntentId>> {
        self.ids_where(
            "SELECT id FROM sync_intents
             WHERE status = 'COMPLETED' AND processed_at < ?1
             ORDER BY seq ASC",
            params![millis(cutoff)],
        )
    }

    /// Deletes a COMPLETED intent. Returns false if it is gone or not COMPLETED.
    pub fn delete_completed(&self, id: &IntentId) -> StorageResult<bool> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM sync_intents WHERE id = ?1 AND status = 'COMPLETED'",
                params![id.to_string()],
            )?)
        })?;
        Ok(changed > 0)
    }

    /// Ids of FAILED intents created after `created_after` with fewer than
    /// `max_attempts` attempts.
    pub fn rearmable(
        &self,
        created_after: DateTime<Utc>,
        max_attempts: u32,
    ) -> StorageResult<Vec<IntentId>> {
        self.ids_where(
            "SELECT id FROM sync_intents
             WHERE status = 'FAILED' AND created_at > ?1 AND attempts < ?2
             ORDER BY seq ASC",
            params![millis(created_after), max_attempts],
        )
    }

    /// Moves a FAILED intent back to PENDING. Returns false if it is not FAILED.
    pub fn rearm(&self, id: &IntentId) -> StorageResult<bool> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE sync_intents SET status = 'PENDING', processed_at = NULL
                 WHERE id = ?1 AND status = 'FAILED'",
                params![id.to_string()],
            )?)
        })?;
        Ok(changed > 0)
    }

    fn ids_where(&self, sql: &str, args: impl rusqlite::Params) -> StorageResult<Vec<IntentId>> {
        let raw = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(args, |row| row.get::<_, String>(0))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })?;
        raw.iter()
            .map(|s| {
                IntentId::parse(s)
                    .map_err(|e| StorageError::InvalidData(format!("intent id {s}: {e}")))
            })
            .collect()
    }
}
