//! Containers, pages and elements as JSON documents.

use crate::{is_constraint_violation, millis, timestamp, Database, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use offdeck_types::{ResourceKind, ServerVersion};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

/// A stored container, page or element.
///
/// `data` holds the document fields; identity and ownership live in their
/// own columns and are never taken from client documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub kind: ResourceKind,
    pub parent_id: Option<String>,
    pub owner_id: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Version stamp of this record as seen by conflict detection.
    pub fn server_version(&self) -> ServerVersion {
        ServerVersion::from_updated_at(self.updated_at)
    }
}

type RawRecord = (String, String, Option<String>, String, String, i64, i64);

fn decode(raw: RawRecord) -> StorageResult<Record> {
    let (kind, id, parent_id, owner_id, data, created_at, updated_at) = raw;
    Ok(Record {
        id,
        kind: kind.parse()?,
        parent_id,
        owner_id,
        data: serde_json::from_str(&data)?,
        created_at: timestamp(created_at)?,
        updated_at: timestamp(updated_at)?,
    })
}

/// Per-record get/insert/update/delete over the `records` table.
#[derive(Clone)]
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Loads a record, if present.
    pub fn get(&self, kind: ResourceKind, id: &str) -> StorageResult<Option<Record>> {
        let raw = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT kind, id, parent_id, owner_id, data, created_at, updated_at
                     FROM records WHERE kind = ?1 AND id = ?2",
                    params![kind.as_str(), id],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        ))
                    },
                )
                .optional()?)
        })?;
        raw.map(decode).transpose()
    }

    /// Inserts a new record. Fails with `AlreadyExists` if the id is taken.
    pub fn insert(&self, record: &Record) -> StorageResult<()> {
        let data = serde_json::to_string(&record.data)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO records (kind, id, parent_id, owner_id, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.kind.as_str(),
                    record.id,
                    record.parent_id,
                    record.owner_id,
                    data,
                    millis(record.created_at),
                    millis(record.updated_at),
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StorageError::AlreadyExists(format!("{} {}", record.kind, record.id))
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
    }

    /// Replaces a record's document and bumps `updated_at`.
    pub fn update_data(
        &self,
        kind: ResourceKind,
        id: &str,
        data: &serde_json::Value,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<Record> {
        let json = serde_json::to_string(data)?;
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE records SET data = ?1, updated_at = ?2 WHERE kind = ?3 AND id = ?4",
                params![json, millis(updated_at), kind.as_str(), id],
            )?)
        })?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("{kind} {id}")));
        }
        self.get(kind, id)?
            .ok_or_else(|| StorageError::NotFound(format!("{kind} {id}")))
    }

    /// Deletes a record. Fails with `NotFound` if it does not exist.
    pub fn delete(&self, kind: ResourceKind, id: &str) -> StorageResult<()> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM records WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
            )?)
        })?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("{kind} {id}")));
        }
        Ok(())
    }

    /// Lists the direct children of a record, oldest first.
    pub fn children(&self, kind: ResourceKind, parent_id: &str) -> StorageResult<Vec<Record>> {
        let raws = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT kind, id, parent_id, owner_id, data, created_at, updated_at
                 FROM records WHERE kind = ?1 AND parent_id = ?2
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![kind.as_str(), parent_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?;
            Ok(rows.collect::<Result<Vec<RawRecord>, _>>()?)
        })?;
        raws.into_iter().map(decode).collect()
    }
}
