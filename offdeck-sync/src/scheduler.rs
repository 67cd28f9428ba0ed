//! Runs maintenance sweeps on fixed intervals.
//!
//! Each registered job gets its own tokio task. The first run happens one
//! full period after `start`, not immediately. Job bodies touch SQLite, so
//! they run on the blocking pool.

use crate::error::SyncResult;
use crate::maintenance::{MaintenanceJobs, SweepReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

type JobFn = Arc<dyn Fn() -> SyncResult<SweepReport> + Send + Sync>;

struct ScheduledJob {
    name: &'static str,
    period: Duration,
    run: JobFn,
}

/// A set of periodic jobs, not yet running.
#[derive(Default)]
pub struct MaintenanceScheduler {
    jobs: Vec<ScheduledJob>,
}

impl MaintenanceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules the standard cleanup and re-arm sweeps at the intervals
    /// from the jobs' configuration.
    pub fn for_jobs(jobs: Arc<MaintenanceJobs>) -> Self {
        let cleanup_every = jobs.config().cleanup_interval();
        let rearm_every = jobs.config().rearm_interval();
        let cleanup = Arc::clone(&jobs);
        Self::new()
            .every("cleanup-completed", cleanup_every, move || cleanup.cleanup_completed())
            .every("rearm-failed", rearm_every, move || jobs.rearm_failed())
    }

    /// Adds a job that runs once per `period`.
    #[must_use]
    pub fn every(
        mut self,
        name: &'static str,
        period: Duration,
        run: impl Fn() -> SyncResult<SweepReport> + Send + Sync + 'static,
    ) -> Self {
        self.jobs.push(ScheduledJob {
            name,
            period,
            run: Arc::new(run),
        });
        self
    }

    /// Spawns one task per job. Must be called inside a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, _) = watch::channel(false);
        let tasks = self
            .jobs
            .into_iter()
            .map(|job| {
                info!("Scheduling {} every {:?}", job.name, job.period);
                tokio::spawn(run_periodic(job, shutdown.subscribe()))
            })
            .collect();
        SchedulerHandle { shutdown, tasks }
    }
}

/// Running scheduler. Dropping the handle also ends the jobs, but without
/// waiting for a sweep in progress.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Number of scheduled jobs.
    pub fn job_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signals every job to stop and waits for them. A job that is mid-run
    /// finishes its current sweep first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Maintenance task ended abnormally: {}", e);
            }
        }
        info!("Maintenance scheduler stopped");
    }
}

async fn run_periodic(job: ScheduledJob, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now() + job.period, job.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let run = Arc::clone(&job.run);
                match tokio::task::spawn_blocking(move || run()).await {
                    Ok(Ok(report)) => debug!("{} finished: {:?}", job.name, report),
                    Ok(Err(e)) => warn!("{} failed: {}", job.name, e),
                    Err(e) => warn!("{} panicked: {}", job.name, e),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("{} stopped", job.name);
}
