//! Conflict detection and resolution for clients coming back online.
//!
//! Detection is a three-way comparison between the server's current
//! container, the client's proposed container, and the client's cached
//! baseline. A field only conflicts when both sides moved away from the
//! baseline and landed on different values.

use crate::error::{SyncError, SyncResult};
use offdeck_storage::{CacheStore, Database, Record, RecordStore};
use offdeck_types::{Clock, ContainerId, ResourceKind, ServerVersion, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Scalar container fields compared during detection.
pub const CONFLICT_FIELDS: [&str; 3] = ["title", "description", "status"];

/// Server-owned fields that no client document may override.
pub const IDENTITY_FIELDS: [&str; 3] = ["id", "createdAt", "ownerId"];

const UPDATED_AT: &str = "updatedAt";

/// Identity fields plus the update stamp; never copied from a client.
fn is_server_managed(key: &str) -> bool {
    key == UPDATED_AT || IDENTITY_FIELDS.contains(&key)
}

/// How a detected divergence is to be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictStrategy {
    ServerWins,
    ClientWins,
    Merge,
    Manual,
}

/// Outcome of [`ConflictResolver::detect`]. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub strategy: ConflictStrategy,
    pub server_version: ServerVersion,
    pub client_version: i64,
    /// The server's current container document.
    pub server_data: Value,
    /// The document the client proposed.
    pub client_data: Value,
    /// Present when `strategy` is `Merge`.
    pub merged_version: Option<Value>,
    /// Fields both sides changed to different values.
    pub conflicting_fields: Vec<String>,
}

impl ConflictReport {
    /// Returns the report with a caller-chosen strategy, e.g. after the
    /// user settled a MANUAL conflict.
    #[must_use]
    pub fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Detects and settles divergence between cached, client and server state.
#[derive(Clone)]
pub struct ConflictResolver {
    records: RecordStore,
    cache: CacheStore,
    clock: Arc<dyn Clock>,
}

impl ConflictResolver {
    pub fn new(db: &Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: db.records(),
            cache: db.cache(),
            clock,
        }
    }

    /// Compares a client's proposed container against the server.
    ///
    /// Returns `None` when the client's version already covers the server
    /// version, regardless of field values.
    pub fn detect(
        &self,
        user: &UserId,
        container: &ContainerId,
        client_version: i64,
        client_data: &Value,
    ) -> SyncResult<Option<ConflictReport>> {
        let server = self.load_container(container)?;
        let server_version = server.server_version();

        if server_version.is_covered_by(client_version) {
            debug!(
                "Client version {} covers server version {} for {}",
                client_version, server_version, container
            );
            return Ok(None);
        }

        if !client_data.is_object() {
            return Err(SyncError::Validation("client data must be a JSON object".into()));
        }
        let cached = self.cache.get(user, container)?;

        let baseline = cached.map(|entry| entry.data).unwrap_or(Value::Null);
        let server_data = container_document(&server);

        let conflicting_fields: Vec<String> = CONFLICT_FIELDS
            .iter()
            .filter(|field| {
                let base = baseline.get(**field);
                let theirs = server_data.get(**field);
                let Some(ours) = client_data.get(**field) else {
                    return false;
                };
                theirs != base && Some(ours) != base && Some(ours) != theirs
            })
            .map(|field| field.to_string())
            .collect();

        let report = if conflicting_fields.is_empty() {
            let merged = merge_documents(&server_data, client_data, &baseline);
            info!(
                "Auto-merging {} (server {}, client {})",
                container, server_version, client_version
            );
            ConflictReport {
                strategy: ConflictStrategy::Merge,
                server_version,
                client_version,
                server_data,
                client_data: client_data.clone(),
                merged_version: Some(merged),
                conflicting_fields,
            }
        } else {
            info!(
                "Manual resolution needed for {}: {:?}",
                container, conflicting_fields
            );
            ConflictReport {
                strategy: ConflictStrategy::Manual,
                server_version,
                client_version,
                server_data,
                client_data: client_data.clone(),
                merged_version: None,
                conflicting_fields,
            }
        };
        Ok(Some(report))
    }

    /// Applies the report's strategy and returns the resulting document.
    ///
    /// A MANUAL report always fails without touching the store or cache.
    pub fn resolve(
        &self,
        user: &UserId,
        container: &ContainerId,
        report: &ConflictReport,
    ) -> SyncResult<Value> {
        let (data, version) = match report.strategy {
            ConflictStrategy::Manual => return Err(SyncError::ManualResolutionRequired),
            ConflictStrategy::ServerWins => {
                (report.server_data.clone(), report.server_version)
            }
            ConflictStrategy::ClientWins => self.write_container(container, &report.client_data)?,
            ConflictStrategy::Merge => {
                let merged = report.merged_version.as_ref().ok_or_else(|| {
                    SyncError::Validation("merge requested without a merged version".into())
                })?;
                self.write_container(container, merged)?
            }
        };

        self.cache
            .upsert(user, container, &data, version.as_i64(), self.clock.now())?;
        info!(
            "Resolved {} for {} with {:?} at version {}",
            container, user, report.strategy, version
        );
        Ok(data)
    }

    fn load_container(&self, container: &ContainerId) -> SyncResult<Record> {
        self.records
            .get(ResourceKind::Container, container.as_str())?
            .ok_or_else(|| SyncError::Validation(format!("container {container} does not exist")))
    }

    /// Patches a client-supplied document onto the container. Fields the
    /// document leaves out keep their stored values, as do the store's
    /// identity columns. Returns the stored document and its new version.
    fn write_container(
        &self,
        container: &ContainerId,
        document: &Value,
    ) -> SyncResult<(Value, ServerVersion)> {
        let Some(fields) = document.as_object() else {
            return Err(SyncError::Validation("container document must be a JSON object".into()));
        };
        let mut data = match self.load_container(container)?.data {
            Value::Object(stored) => stored,
            _ => Map::new(),
        };
        for (key, value) in fields {
            if !is_server_managed(key) {
                data.insert(key.clone(), value.clone());
            }
        }

        let record = self.records.update_data(
            ResourceKind::Container,
            container.as_str(),
            &Value::Object(data),
            self.clock.now(),
        )?;
        Ok((container_document(&record), record.server_version()))
    }
}

/// The container as clients see it: document fields plus identity.
fn container_document(record: &Record) -> Value {
    let mut doc = match &record.data {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };
    doc.insert("id".into(), Value::String(record.id.clone()));
    doc.insert("ownerId".into(), Value::String(record.owner_id.clone()));
    doc.insert("createdAt".into(), Value::String(record.created_at.to_rfc3339()));
    doc.insert(UPDATED_AT.into(), Value::String(record.updated_at.to_rfc3339()));
    Value::Object(doc)
}

/// Shallow merge of client fields over the server document.
///
/// A client field still equal to the baseline is one the client never
/// touched, so the server's value stands. Identity fields always come from
/// the server.
fn merge_documents(server: &Value, client: &Value, baseline: &Value) -> Value {
    let mut merged = match server {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };
    if let Some(fields) = client.as_object() {
        for (key, value) in fields {
            if is_server_managed(key) {
                continue;
            }
            let client_untouched = baseline.get(key) == Some(value);
            if client_untouched && merged.contains_key(key) {
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}
