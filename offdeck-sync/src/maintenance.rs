//! Periodic sweeps over the intent log.
//!
//! Both sweeps work item by item: an error on one intent is logged and
//! counted, and the sweep moves on. Running a sweep twice in a row has no
//! effect beyond the first run.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use offdeck_storage::{Database, IntentStore};
use offdeck_types::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Intents selected by the sweep.
    pub examined: usize,
    /// Intents actually deleted or re-armed.
    pub affected: usize,
    /// Intents the sweep could not update.
    pub errors: usize,
}

/// Cleanup and re-arm jobs for the intent log.
pub struct MaintenanceJobs {
    intents: IntentStore,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl MaintenanceJobs {
    pub fn new(db: &Database, clock: Arc<dyn Clock>, config: SyncConfig) -> Self {
        Self {
            intents: db.intents(),
            clock,
            config,
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Deletes COMPLETED intents processed before the retention window.
    pub fn cleanup_completed(&self) -> SyncResult<SweepReport> {
        let cutoff = self.clock.now() - self.config.completed_retention();
        let due = self.intents.completed_before(cutoff)?;

        let mut report = SweepReport {
            examined: due.len(),
            ..Default::default()
        };
        for id in &due {
            match self.intents.delete_completed(id) {
                Ok(true) => report.affected += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Cleanup could not delete intent {}: {}", id, e);
                    report.errors += 1;
                }
            }
        }

        info!(
            "Cleanup removed {}/{} completed intents ({} errors)",
            report.affected, report.examined, report.errors
        );
        Ok(report)
    }

    /// Returns recent FAILED intents with attempts to spare to PENDING.
    pub fn rearm_failed(&self) -> SyncResult<SweepReport> {
        let created_after = self.clock.now() - self.config.rearm_window();
        let candidates = self
            .intents
            .rearmable(created_after, self.config.rearm_max_attempts)?;

        let mut report = SweepReport {
            examined: candidates.len(),
            ..Default::default()
        };
        for id in &candidates {
            match self.intents.rearm(id) {
                Ok(true) => report.affected += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Re-arm could not reset intent {}: {}", id, e);
                    report.errors += 1;
                }
            }
        }

        info!(
            "Re-armed {}/{} failed intents ({} errors)",
            report.affected, report.examined, report.errors
        );
        Ok(report)
    }
}
