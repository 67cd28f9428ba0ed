//! Wall-clock access and the server version stamp.
//!
//! Everything that stamps `created_at`, `processed_at` or `last_synced`, and
//! every retention cutoff, reads time through a [`Clock`] so that tests can
//! drive it explicitly.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The process wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward (or backward, for a negative delta).
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }

    /// Jumps the clock to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Converts Unix milliseconds back into a UTC instant.
///
/// Returns `None` for values outside chrono's representable range.
#[must_use]
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Version stamp of a server record, derived from its last-modified time.
///
/// This is an optimistic-concurrency proxy, not a logical clock: two writes
/// that land within the same millisecond produce the same stamp and cannot
/// be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerVersion(i64);

impl ServerVersion {
    /// Creates a version stamp from raw milliseconds.
    #[must_use]
    pub const fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Derives the stamp from a record's `updated_at`.
    #[must_use]
    pub fn from_updated_at(updated_at: DateTime<Utc>) -> Self {
        Self(updated_at.timestamp_millis())
    }

    /// Returns the stamp as an integer, comparable with client versions.
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// True when a client holding `client_version` has already seen this
    /// server state.
    #[must_use]
    pub const fn is_covered_by(&self, client_version: i64) -> bool {
        client_version >= self.0
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ServerVersion> for i64 {
    fn from(v: ServerVersion) -> Self {
        v.0
    }
}
