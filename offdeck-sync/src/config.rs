//! Tunables for queue processing and maintenance.

use crate::error::{SyncError, SyncResult};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Processing attempts before an intent becomes FAILED.
    pub max_attempts: u32,
    /// Whether a scoped drain may refresh the cache while some of its
    /// intents went back to PENDING for retry. Terminal failures always
    /// block the refresh.
    pub refresh_cache_with_pending_retries: bool,
    /// Age after which COMPLETED intents are purged.
    pub completed_retention_days: i64,
    /// Only FAILED intents created within this window are re-armed.
    pub rearm_window_days: i64,
    /// FAILED intents with at least this many attempts stay failed.
    pub rearm_max_attempts: u32,
    /// Period of the completed-intent cleanup.
    pub cleanup_interval_secs: u64,
    /// Period of the failed-intent re-arm.
    pub rearm_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            refresh_cache_with_pending_retries: true,
            completed_retention_days: 30,
            rearm_window_days: 7,
            rearm_max_attempts: 5,
            cleanup_interval_secs: 60 * 60,
            rearm_interval_secs: 24 * 60 * 60,
        }
    }
}

impl SyncConfig {
    /// Loads a JSON config file; missing keys take their defaults.
    pub fn from_path(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| SyncError::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.max_attempts == 0 {
            return Err(SyncError::Config("max_attempts must be at least 1".into()));
        }
        if self.completed_retention_days < 0 || self.rearm_window_days < 0 {
            return Err(SyncError::Config("retention windows must not be negative".into()));
        }
        if self.cleanup_interval_secs == 0 || self.rearm_interval_secs == 0 {
            return Err(SyncError::Config("maintenance intervals must be non-zero".into()));
        }
        Ok(())
    }

    pub fn completed_retention(&self) -> TimeDelta {
        TimeDelta::days(self.completed_retention_days)
    }

    pub fn rearm_window(&self) -> TimeDelta {
        TimeDelta::days(self.rearm_window_days)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn rearm_interval(&self) -> Duration {
        Duration::from_secs(self.rearm_interval_secs)
    }
}
