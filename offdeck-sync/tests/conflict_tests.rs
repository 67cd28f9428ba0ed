use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use offdeck_storage::Record;
use offdeck_sync::{
    ConflictResolver, ConflictStrategy, Database, OfflineCache, SyncError, IDENTITY_FIELDS,
};
use offdeck_types::{ContainerId, ManualClock, ResourceKind, ServerVersion, UserId};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap()
}

fn alice() -> UserId {
    UserId::new("alice")
}

fn c1() -> ContainerId {
    ContainerId::new("c1")
}

struct Fixture {
    db: Database,
    clock: Arc<ManualClock>,
    cache: OfflineCache,
    resolver: ConflictResolver,
}

impl Fixture {
    fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        Self {
            cache: OfflineCache::new(&db, clock.clone()),
            resolver: ConflictResolver::new(&db, clock.clone()),
            db,
            clock,
        }
    }

    /// Stores container c1 as last modified at `updated_at`; returns its
    /// server version.
    fn server(&self, data: Value, updated_at: DateTime<Utc>) -> i64 {
        self.db
            .records()
            .insert(&Record {
                id: "c1".into(),
                kind: ResourceKind::Container,
                parent_id: None,
                owner_id: "alice".into(),
                data,
                created_at: t0(),
                updated_at,
            })
            .unwrap();
        ServerVersion::from_updated_at(updated_at).as_i64()
    }

    /// Caches the client's baseline at the t0 version; returns that version.
    fn baseline(&self, data: Value) -> i64 {
        let version = ServerVersion::from_updated_at(t0()).as_i64();
        self.cache.put(&alice(), &c1(), &data, version).unwrap();
        version
    }

    fn stored(&self) -> Record {
        self.db
            .records()
            .get(ResourceKind::Container, "c1")
            .unwrap()
            .unwrap()
    }
}

fn later() -> DateTime<Utc> {
    t0() + TimeDelta::hours(1)
}

// ── Detection ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn covered_client_version_never_conflicts(
        server_title in "[a-zA-Z ]{0,12}",
        client_title in "[a-zA-Z ]{0,12}",
        baseline_title in "[a-zA-Z ]{0,12}",
        ahead in 0i64..1_000_000,
    ) {
        let f = Fixture::new();
        f.baseline(json!({"title": baseline_title}));
        let server_version = f.server(json!({"title": server_title}), later());

        let report = f
            .resolver
            .detect(&alice(), &c1(), server_version + ahead, &json!({"title": client_title}))
            .unwrap();
        prop_assert!(report.is_none());
    }
}

#[test]
fn client_only_change_merges() {
    let f = Fixture::new();
    let client_version = f.baseline(json!({"title": "A"}));
    let server_version = f.server(json!({"title": "A"}), later());

    let report = f
        .resolver
        .detect(&alice(), &c1(), client_version, &json!({"title": "B"}))
        .unwrap()
        .unwrap();

    assert_eq!(report.strategy, ConflictStrategy::Merge);
    assert_eq!(report.server_version.as_i64(), server_version);
    assert_eq!(report.client_version, client_version);
    assert!(report.conflicting_fields.is_empty());
    let merged = report.merged_version.unwrap();
    assert_eq!(merged["title"], "B");
    assert_eq!(merged["id"], "c1");
}

#[test]
fn both_sides_changed_differently_is_manual() {
    let f = Fixture::new();
    let client_version = f.baseline(json!({"title": "A"}));
    f.server(json!({"title": "B"}), later());

    let report = f
        .resolver
        .detect(&alice(), &c1(), client_version, &json!({"title": "C"}))
        .unwrap()
        .unwrap();

    assert_eq!(report.strategy, ConflictStrategy::Manual);
    assert_eq!(report.conflicting_fields, vec!["title".to_string()]);
    assert!(report.merged_version.is_none());
    assert_eq!(report.server_data["title"], "B");
    assert_eq!(report.client_data, json!({"title": "C"}));
}

#[test]
fn both_sides_agreeing_is_not_a_conflict() {
    let f = Fixture::new();
    let client_version = f.baseline(json!({"title": "A"}));
    f.server(json!({"title": "B"}), later());

    let report = f
        .resolver
        .detect(&alice(), &c1(), client_version, &json!({"title": "B"}))
        .unwrap()
        .unwrap();
    assert_eq!(report.strategy, ConflictStrategy::Merge);
}

#[test]
fn only_conflicting_fields_are_listed() {
    let f = Fixture::new();
    let client_version = f.baseline(json!({
        "title": "A", "description": "d", "status": "draft"
    }));
    f.server(
        json!({"title": "A2", "description": "d2", "status": "draft"}),
        later(),
    );

    let client = json!({"title": "A3", "description": "d", "status": "done"});
    let report = f
        .resolver
        .detect(&alice(), &c1(), client_version, &client)
        .unwrap()
        .unwrap();
    assert_eq!(report.strategy, ConflictStrategy::Manual);
    assert_eq!(report.conflicting_fields, vec!["title".to_string()]);
}

#[test]
fn omitted_client_field_is_unchanged() {
    let f = Fixture::new();
    let client_version = f.baseline(json!({"title": "A", "status": "draft"}));
    f.server(json!({"title": "A", "status": "done"}), later());

    let report = f
        .resolver
        .detect(&alice(), &c1(), client_version, &json!({"title": "B"}))
        .unwrap()
        .unwrap();
    assert_eq!(report.strategy, ConflictStrategy::Merge);
    let merged = report.merged_version.unwrap();
    assert_eq!(merged["title"], "B");
    assert_eq!(merged["status"], "done");
}

#[test]
fn merge_keeps_server_values_the_client_did_not_touch() {
    let f = Fixture::new();
    let client_version = f.baseline(json!({"title": "A", "description": "old"}));
    f.server(json!({"title": "A", "description": "new"}), later());

    let report = f
        .resolver
        .detect(
            &alice(),
            &c1(),
            client_version,
            &json!({"title": "B", "description": "old"}),
        )
        .unwrap()
        .unwrap();
    let merged = report.merged_version.unwrap();
    assert_eq!(merged["title"], "B");
    assert_eq!(merged["description"], "new");
}

#[test]
fn without_baseline_any_difference_conflicts() {
    let f = Fixture::new();
    f.server(json!({"title": "A"}), later());

    let report = f
        .resolver
        .detect(&alice(), &c1(), 0, &json!({"title": "B"}))
        .unwrap()
        .unwrap();
    assert_eq!(report.strategy, ConflictStrategy::Manual);
}

#[test]
fn missing_container_is_validation_error() {
    let f = Fixture::new();
    let err = f
        .resolver
        .detect(&alice(), &c1(), 0, &json!({"title": "B"}))
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

#[test]
fn non_object_client_data_is_rejected() {
    let f = Fixture::new();
    f.server(json!({"title": "A"}), later());
    let err = f
        .resolver
        .detect(&alice(), &c1(), 0, &json!(["title", "B"]))
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

#[test]
fn covered_version_skips_client_data_checks() {
    let f = Fixture::new();
    let server_version = f.server(json!({"title": "A"}), later());
    for client in [json!(["title", "B"]), json!("B"), Value::Null] {
        assert!(f
            .resolver
            .detect(&alice(), &c1(), server_version, &client)
            .unwrap()
            .is_none());
    }
}

// ── Resolution ───────────────────────────────────────────────────

#[test]
fn manual_resolution_changes_nothing() {
    let f = Fixture::new();
    let client_version = f.baseline(json!({"title": "A"}));
    f.server(json!({"title": "B"}), later());
    let report = f
        .resolver
        .detect(&alice(), &c1(), client_version, &json!({"title": "C"}))
        .unwrap()
        .unwrap();

    let record_before = f.stored();
    let cache_before = f.cache.get(&alice(), &c1()).unwrap();
    f.clock.advance(TimeDelta::minutes(1));

    let err = f.resolver.resolve(&alice(), &c1(), &report).unwrap_err();
    assert!(matches!(err, SyncError::ManualResolutionRequired));
    assert_eq!(f.stored(), record_before);
    assert_eq!(f.cache.get(&alice(), &c1()).unwrap(), cache_before);
}

#[test]
fn server_wins_caches_server_document() {
    let f = Fixture::new();
    let client_version = f.baseline(json!({"title": "A"}));
    let server_version = f.server(json!({"title": "B"}), later());
    let report = f
        .resolver
        .detect(&alice(), &c1(), client_version, &json!({"title": "C"}))
        .unwrap()
        .unwrap()
        .with_strategy(ConflictStrategy::ServerWins);

    let record_before = f.stored();
    let doc = f.resolver.resolve(&alice(), &c1(), &report).unwrap();
    assert_eq!(doc["title"], "B");
    assert_eq!(f.stored(), record_before);

    let entry = f.cache.get(&alice(), &c1()).unwrap();
    assert_eq!(entry.data, doc);
    assert_eq!(entry.version, server_version);
    assert!(!entry.pending_sync);
}

#[test]
fn client_wins_patches_client_fields() {
    let f = Fixture::new();
    let client_version = f.baseline(json!({"title": "A"}));
    f.server(json!({"title": "B", "status": "draft"}), later());
    let report = f
        .resolver
        .detect(&alice(), &c1(), client_version, &json!({"title": "C"}))
        .unwrap()
        .unwrap()
        .with_strategy(ConflictStrategy::ClientWins);

    f.clock.set(later() + TimeDelta::minutes(10));
    let doc = f.resolver.resolve(&alice(), &c1(), &report).unwrap();
    assert_eq!(doc["title"], "C");

    let record = f.stored();
    assert_eq!(record.data, json!({"title": "C", "status": "draft"}));
    assert_eq!(record.updated_at, later() + TimeDelta::minutes(10));
    assert_eq!(doc["status"], "draft");

    let entry = f.cache.get(&alice(), &c1()).unwrap();
    assert_eq!(entry.data, doc);
    assert_eq!(entry.version, record.server_version().as_i64());
}

#[test]
fn merge_resolution_writes_merged_document() {
    let f = Fixture::new();
    let client_version = f.baseline(json!({"title": "A", "description": "old"}));
    f.server(json!({"title": "A", "description": "new"}), later());
    let report = f
        .resolver
        .detect(
            &alice(),
            &c1(),
            client_version,
            &json!({"title": "B", "description": "old"}),
        )
        .unwrap()
        .unwrap();
    assert_eq!(report.strategy, ConflictStrategy::Merge);

    f.clock.set(later() + TimeDelta::minutes(1));
    f.resolver.resolve(&alice(), &c1(), &report).unwrap();

    let record = f.stored();
    assert_eq!(record.data, json!({"title": "B", "description": "new"}));
    let entry = f.cache.get(&alice(), &c1()).unwrap();
    assert_eq!(entry.version, record.server_version().as_i64());
    assert_eq!(entry.data["title"], "B");
}

#[test]
fn merge_without_merged_version_is_rejected() {
    let f = Fixture::new();
    let client_version = f.baseline(json!({"title": "A"}));
    f.server(json!({"title": "B"}), later());
    let report = f
        .resolver
        .detect(&alice(), &c1(), client_version, &json!({"title": "C"}))
        .unwrap()
        .unwrap()
        .with_strategy(ConflictStrategy::Merge);

    let err = f.resolver.resolve(&alice(), &c1(), &report).unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

#[test]
fn identity_fields_survive_client_wins() {
    let f = Fixture::new();
    let client_version = f.baseline(json!({"title": "A"}));
    f.server(json!({"title": "B"}), later());
    let client = json!({
        "title": "C",
        "id": "hijacked",
        "ownerId": "mallory",
        "createdAt": "1970-01-01T00:00:00Z",
    });
    let report = f
        .resolver
        .detect(&alice(), &c1(), client_version, &client)
        .unwrap()
        .unwrap()
        .with_strategy(ConflictStrategy::ClientWins);

    let doc = f.resolver.resolve(&alice(), &c1(), &report).unwrap();
    assert_eq!(doc["id"], "c1");
    assert_eq!(doc["ownerId"], "alice");
    assert_eq!(doc["createdAt"], Value::String(t0().to_rfc3339()));

    let record = f.stored();
    assert_eq!(record.owner_id, "alice");
    assert_eq!(record.created_at, t0());
    for field in IDENTITY_FIELDS {
        assert!(record.data.get(field).is_none(), "{field} leaked into data");
    }
}
