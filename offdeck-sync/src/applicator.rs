//! Resource appliers - apply queued intents to the record store.
//!
//! One applier per resource kind. The processor looks the applier up by the
//! payload's kind and calls it through [`apply_intent`], which dispatches on
//! the operation. Replacing an applier (for example with one that talks to
//! a remote API) only requires registering a different implementation.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use offdeck_storage::{Database, Record, RecordStore};
use offdeck_types::{IntentPayload, Operation, ResourceKind, UserId};
use tracing::debug;

/// What an applier knows about the intent beyond its payload.
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext<'a> {
    /// User that queued the intent; becomes the owner of created records.
    pub user_id: &'a UserId,
    /// Timestamp for `created_at` / `updated_at`.
    pub now: DateTime<Utc>,
}

/// Performs create/update/delete for one resource kind.
pub trait ResourceApplier: Send + Sync {
    /// The resource kind this applier handles.
    fn kind(&self) -> ResourceKind;

    fn create(&self, ctx: &ApplyContext<'_>, payload: &IntentPayload) -> SyncResult<()>;

    fn update(&self, ctx: &ApplyContext<'_>, payload: &IntentPayload) -> SyncResult<()>;

    fn delete(&self, ctx: &ApplyContext<'_>, payload: &IntentPayload) -> SyncResult<()>;
}

/// Dispatches an operation to the matching applier method.
pub fn apply_intent(
    applier: &dyn ResourceApplier,
    ctx: &ApplyContext<'_>,
    operation: Operation,
    payload: &IntentPayload,
) -> SyncResult<()> {
    if payload.kind() != applier.kind() {
        return Err(SyncError::UnsupportedResource(format!(
            "{} applier cannot apply a {} payload",
            applier.kind(),
            payload.kind()
        )));
    }
    match operation {
        Operation::Create => applier.create(ctx, payload),
        Operation::Update => applier.update(ctx, payload),
        Operation::Delete => applier.delete(ctx, payload),
    }
}

/// Creates, patches and deletes container records.
pub struct ContainerApplier {
    records: RecordStore,
}

impl ContainerApplier {
    pub fn new(db: &Database) -> Self {
        Self {
            records: db.records(),
        }
    }
}

impl ResourceApplier for ContainerApplier {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Container
    }

    fn create(&self, ctx: &ApplyContext<'_>, payload: &IntentPayload) -> SyncResult<()> {
        insert_record(&self.records, ctx, payload)
    }

    fn update(&self, ctx: &ApplyContext<'_>, payload: &IntentPayload) -> SyncResult<()> {
        patch_record(&self.records, ctx, payload)
    }

    fn delete(&self, _ctx: &ApplyContext<'_>, payload: &IntentPayload) -> SyncResult<()> {
        let id = payload.target_id();
        for page in self.records.children(ResourceKind::Page, id)? {
            delete_page_tree(&self.records, &page.id)?;
        }
        self.records.delete(ResourceKind::Container, id)?;
        debug!("Deleted container {}", id);
        Ok(())
    }
}

/// Creates, patches and deletes page records.
pub struct PageApplier {
    records: RecordStore,
}

impl PageApplier {
    pub fn new(db: &Database) -> Self {
        Self {
            records: db.records(),
        }
    }
}

impl ResourceApplier for PageApplier {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Page
    }

    fn create(&self, ctx: &ApplyContext<'_>, payload: &IntentPayload) -> SyncResult<()> {
        require_parent(&self.records, ResourceKind::Container, payload)?;
        insert_record(&self.records, ctx, payload)
    }

    fn update(&self, ctx: &ApplyContext<'_>, payload: &IntentPayload) -> SyncResult<()> {
        patch_record(&self.records, ctx, payload)
    }

    fn delete(&self, _ctx: &ApplyContext<'_>, payload: &IntentPayload) -> SyncResult<()> {
        delete_page_tree(&self.records, payload.target_id())
    }
}

/// Creates, patches and deletes element records.
pub struct ElementApplier {
    records: RecordStore,
}

impl ElementApplier {
    pub fn new(db: &Database) -> Self {
        Self {
            records: db.records(),
        }
    }
}

impl ResourceApplier for ElementApplier {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Element
    }

    fn create(&self, ctx: &ApplyContext<'_>, payload: &IntentPayload) -> SyncResult<()> {
        require_parent(&self.records, ResourceKind::Page, payload)?;
        insert_record(&self.records, ctx, payload)
    }

    fn update(&self, ctx: &ApplyContext<'_>, payload: &IntentPayload) -> SyncResult<()> {
        patch_record(&self.records, ctx, payload)
    }

    fn delete(&self, _ctx: &ApplyContext<'_>, payload: &IntentPayload) -> SyncResult<()> {
        self.records
            .delete(ResourceKind::Element, payload.target_id())?;
        debug!("Deleted element {}", payload.target_id());
        Ok(())
    }
}

fn insert_record(
    records: &RecordStore,
    ctx: &ApplyContext<'_>,
    payload: &IntentPayload,
) -> SyncResult<()> {
    let data = match payload.data() {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => other.clone(),
    };
    let record = Record {
        id: payload.target_id().to_string(),
        kind: payload.kind(),
        parent_id: payload.parent_id().map(str::to_string),
        owner_id: ctx.user_id.to_string(),
        data,
        created_at: ctx.now,
        updated_at: ctx.now,
    };
    records.insert(&record)?;
    debug!("Created {} {}", record.kind, record.id);
    Ok(())
}

/// Shallow-merges the payload's top-level fields into the stored document.
fn patch_record(
    records: &RecordStore,
    ctx: &ApplyContext<'_>,
    payload: &IntentPayload,
) -> SyncResult<()> {
    let kind = payload.kind();
    let id = payload.target_id();
    let existing = records
        .get(kind, id)?
        .ok_or_else(|| SyncError::NotFound(format!("{kind} {id}")))?;

    let Some(patch) = payload.data().as_object() else {
        return Err(SyncError::Validation(format!(
            "update for {kind} {id} carries no fields"
        )));
    };

    let mut merged = existing.data;
    match merged.as_object_mut() {
        Some(target) => {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        None => merged = payload.data().clone(),
    }

    records.update_data(kind, id, &merged, ctx.now)?;
    debug!("Updated {} {}", kind, id);
    Ok(())
}

fn require_parent(
    records: &RecordStore,
    parent_kind: ResourceKind,
    payload: &IntentPayload,
) -> SyncResult<()> {
    let Some(parent_id) = payload.parent_id() else {
        return Ok(());
    };
    if records.get(parent_kind, parent_id)?.is_none() {
        return Err(SyncError::NotFound(format!("{parent_kind} {parent_id}")));
    }
    Ok(())
}

fn delete_page_tree(records: &RecordStore, page_id: &str) -> SyncResult<()> {
    for element in records.children(ResourceKind::Element, page_id)? {
        records.delete(ResourceKind::Element, &element.id)?;
    }
    records.delete(ResourceKind::Page, page_id)?;
    debug!("Deleted page {}", page_id);
    Ok(())
}
