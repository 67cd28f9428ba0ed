use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use offdeck_storage::IntentStore;
use offdeck_sync::{Database, MaintenanceJobs, SweepReport, SyncConfig, SyncIntent};
use offdeck_types::{
    ContainerId, IntentPayload, IntentStatus, ManualClock, Operation, PagePayload, UserId,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
}

fn days(n: i64) -> TimeDelta {
    TimeDelta::days(n)
}

struct Fixture {
    intents: IntentStore,
    jobs: MaintenanceJobs,
}

impl Fixture {
    fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let clock = Arc::new(ManualClock::new(now()));
        Self {
            intents: db.intents(),
            jobs: MaintenanceJobs::new(&db, clock, SyncConfig::default()),
        }
    }

    /// Inserts an intent already in `status`.
    fn seed(
        &self,
        status: IntentStatus,
        attempts: u32,
        created_at: DateTime<Utc>,
        processed_at: Option<DateTime<Utc>>,
    ) -> SyncIntent {
        let mut intent = SyncIntent::new(
            UserId::new("alice"),
            ContainerId::new("c1"),
            Operation::Update,
            &IntentPayload::Page(PagePayload {
                id: "p1".into(),
                container_id: "c1".into(),
                data: json!({"title": "x"}),
            }),
            2,
            created_at,
        )
        .unwrap();
        intent.status = status;
        intent.attempts = attempts;
        intent.processed_at = processed_at;
        self.intents.insert(&intent).unwrap();
        intent
    }

    fn status(&self, intent: &SyncIntent) -> Option<IntentStatus> {
        self.intents.get(&intent.id).unwrap().map(|i| i.status)
    }
}

// ── Cleanup ──────────────────────────────────────────────────────

#[test]
fn cleanup_removes_only_old_completed() {
    let f = Fixture::new();
    let old = f.seed(IntentStatus::Completed, 0, now() - days(40), Some(now() - days(31)));
    let recent = f.seed(IntentStatus::Completed, 0, now() - days(40), Some(now() - days(29)));
    let old_failed = f.seed(IntentStatus::Failed, 3, now() - days(40), Some(now() - days(31)));
    let pending = f.seed(IntentStatus::Pending, 0, now() - days(40), None);

    let report = f.jobs.cleanup_completed().unwrap();
    assert_eq!(
        report,
        SweepReport {
            examined: 1,
            affected: 1,
            errors: 0
        }
    );

    assert_eq!(f.status(&old), None);
    assert_eq!(f.status(&recent), Some(IntentStatus::Completed));
    assert_eq!(f.status(&old_failed), Some(IntentStatus::Failed));
    assert_eq!(f.status(&pending), Some(IntentStatus::Pending));
}

#[test]
fn cleanup_is_idempotent() {
    let f = Fixture::new();
    f.seed(IntentStatus::Completed, 0, now() - days(60), Some(now() - days(45)));
    f.seed(IntentStatus::Completed, 1, now() - days(60), Some(now() - days(50)));

    assert_eq!(f.jobs.cleanup_completed().unwrap().affected, 2);
    assert_eq!(f.jobs.cleanup_completed().unwrap(), SweepReport::default());
}

#[test]
fn cleanup_on_empty_log() {
    let f = Fixture::new();
    assert_eq!(f.jobs.cleanup_completed().unwrap(), SweepReport::default());
}

// ── Re-arm ───────────────────────────────────────────────────────

#[test]
fn rearm_resets_recent_failures() {
    let f = Fixture::new();
    let failed = f.seed(IntentStatus::Failed, 3, now() - days(2), Some(now() - days(1)));

    let report = f.jobs.rearm_failed().unwrap();
    assert_eq!(report.affected, 1);

    let stored = f.intents.get(&failed.id).unwrap().unwrap();
    assert_eq!(stored.status, IntentStatus::Pending);
    assert_eq!(stored.attempts, 3);
    assert!(stored.processed_at.is_none());
}

#[test]
fn rearm_respects_window_and_attempt_limit() {
    let f = Fixture::new();
    let stale = f.seed(IntentStatus::Failed, 3, now() - days(8), Some(now() - days(8)));
    let exhausted = f.seed(IntentStatus::Failed, 5, now() - days(1), Some(now() - days(1)));
    let almost = f.seed(IntentStatus::Failed, 4, now() - days(1), Some(now() - days(1)));
    let completed = f.seed(IntentStatus::Completed, 0, now() - days(1), Some(now() - days(1)));

    let report = f.jobs.rearm_failed().unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.affected, 1);

    assert_eq!(f.status(&stale), Some(IntentStatus::Failed));
    assert_eq!(f.status(&exhausted), Some(IntentStatus::Failed));
    assert_eq!(f.status(&almost), Some(IntentStatus::Pending));
    assert_eq!(f.status(&completed), Some(IntentStatus::Completed));
}

#[test]
fn rearm_is_idempotent() {
    let f = Fixture::new();
    f.seed(IntentStatus::Failed, 3, now() - days(1), Some(now()));

    assert_eq!(f.jobs.rearm_failed().unwrap().affected, 1);
    assert_eq!(f.jobs.rearm_failed().unwrap(), SweepReport::default());
}

#[test]
fn rearm_window_is_configurable() {
    let db = Database::open_in_memory().unwrap();
    let config = SyncConfig {
        rearm_window_days: 30,
        ..Default::default()
    };
    let jobs = MaintenanceJobs::new(&db, Arc::new(ManualClock::new(now())), config);
    let f = Fixture {
        intents: db.intents(),
        jobs,
    };
    let older = f.seed(IntentStatus::Failed, 3, now() - days(20), Some(now() - days(20)));

    assert_eq!(f.jobs.rearm_failed().unwrap().affected, 1);
    assert_eq!(f.status(&older), Some(IntentStatus::Pending));
}
