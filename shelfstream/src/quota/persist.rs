//! Flat JSON snapshot of quota state.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from reading or writing a quota snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Snapshot parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Persisted quota counters and breaker trip time.
///
/// Only adopted on load when it belongs to the current calendar period:
/// counters from a different month are discarded entirely, and the daily
/// counter is discarded when the day differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub monthly_count: u64,
    pub daily_count: u64,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub breaker_trip_time: Option<DateTime<Utc>>,
    pub saved_at: DateTime<Utc>,
}

impl QuotaSnapshot {
    /// Loads a snapshot, returning `None` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Writes the snapshot as pretty-printed JSON, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Applies the snapshot to live tracker state, honoring period membership.
    ///
    /// A persisted breaker trip is restored only while its cool-down would
    /// still be running, with the already-elapsed portion carried over.
    pub(crate) fn restore_into(
        &self,
        now: DateTime<Utc>,
        breaker_cooldown: Duration,
        monthly_count: &mut u64,
        daily_count: &mut u64,
        breaker_tripped_at: &mut Option<(Instant, DateTime<Utc>)>,
    ) {
        if self.year != now.year() || self.month != now.month() {
            return;
        }

        *monthly_count = self.monthly_count;
        if self.day == now.day() {
            *daily_count = self.daily_count;
        }

        if let Some(trip_time) = self.breaker_trip_time {
            let elapsed = (now - trip_time).to_std().unwrap_or_default();
            if elapsed < breaker_cooldown {
                if let Some(adjusted) = Instant::now().checked_sub(elapsed) {
                    *breaker_tripped_at = Some((adjusted, trip_time));
                }
            }
        }
    }
}
