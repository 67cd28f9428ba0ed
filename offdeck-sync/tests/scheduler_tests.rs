use chrono::{TimeZone, Utc};
use offdeck_storage::IntentStore;
use offdeck_sync::{
    Database, MaintenanceJobs, MaintenanceScheduler, SweepReport, SyncConfig, SyncError,
    SyncIntent,
};
use offdeck_types::{
    ContainerId, ContainerPayload, IntentPayload, IntentStatus, ManualClock, Operation, UserId,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Result<SweepReport, SyncError> + Send + Sync) {
    let runs = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&runs);
    let job = move || {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(SweepReport::default())
    };
    (runs, job)
}

/// Lets spawned tasks and blocking jobs run without moving the clock.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::ZERO).await;
    }
}

// ── Cadence ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn first_run_waits_one_period() {
    let (runs, job) = counter();
    let handle = MaintenanceScheduler::new()
        .every("count", Duration::from_secs(3600), job)
        .start();
    assert_eq!(handle.job_count(), 1);

    tokio::time::sleep(Duration::from_secs(3599)).await;
    settle().await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    settle().await;
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn jobs_keep_their_own_periods() {
    let (fast_runs, fast) = counter();
    let (slow_runs, slow) = counter();
    let handle = MaintenanceScheduler::new()
        .every("fast", Duration::from_secs(60), fast)
        .every("slow", Duration::from_secs(600), slow)
        .start();

    tokio::time::sleep(Duration::from_secs(601)).await;
    settle().await;
    assert_eq!(fast_runs.load(Ordering::SeqCst), 10);
    assert_eq!(slow_runs.load(Ordering::SeqCst), 1);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failing_job_keeps_running() {
    let runs = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&runs);
    let handle = MaintenanceScheduler::new()
        .every("broken", Duration::from_secs(10), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::Transient("store offline".into()))
        })
        .start();

    tokio::time::sleep(Duration::from_secs(31)).await;
    settle().await;
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    handle.stop().await;
}

// ── Lifecycle ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stop_halts_further_runs() {
    let (runs, job) = counter();
    let handle = MaintenanceScheduler::new()
        .every("count", Duration::from_secs(60), job)
        .start();

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    handle.stop().await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    settle().await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_scheduler_stops_cleanly() {
    let handle = MaintenanceScheduler::new().start();
    assert_eq!(handle.job_count(), 0);
    handle.stop().await;
}

// ── Standard jobs ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn standard_jobs_rearm_on_their_interval() {
    let db = Database::open_in_memory().unwrap();
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
    let intents: IntentStore = db.intents();

    let mut failed = SyncIntent::new(
        UserId::new("alice"),
        ContainerId::new("c1"),
        Operation::Create,
        &IntentPayload::Container(ContainerPayload {
            id: "c1".into(),
            data: json!({}),
        }),
        1,
        now,
    )
    .unwrap();
    failed.status = IntentStatus::Failed;
    failed.attempts = 3;
    failed.processed_at = Some(now);
    intents.insert(&failed).unwrap();

    let config = SyncConfig {
        cleanup_interval_secs: 60,
        rearm_interval_secs: 120,
        ..Default::default()
    };
    let jobs = Arc::new(MaintenanceJobs::new(
        &db,
        Arc::new(ManualClock::new(now)),
        config,
    ));
    let handle = MaintenanceScheduler::for_jobs(jobs).start();
    assert_eq!(handle.job_count(), 2);

    tokio::time::sleep(Duration::from_secs(119)).await;
    settle().await;
    assert_eq!(intents.get(&failed.id).unwrap().unwrap().status, IntentStatus::Failed);

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(intents.get(&failed.id).unwrap().unwrap().status, IntentStatus::Pending);

    handle.stop().await;
}
