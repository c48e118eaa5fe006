//! Quota tracker with circuit-breaker semantics.

use super::persist::QuotaSnapshot;
use crate::config::QuotaSettings;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{error, info, warn};

/// How many usage recordings may pass between snapshot saves.
const PERSIST_EVERY: u64 = 25;

/// Internal mutable state for the quota tracker.
#[derive(Debug)]
struct QuotaState {
    monthly_count: u64,
    daily_count: u64,
    /// Last-seen calendar period, used to detect rollovers.
    current_year: i32,
    current_month: u32,
    current_day: u32,
    /// Circuit breaker trip, if any. The `Instant` drives the cool-down;
    /// the `DateTime` is what gets persisted and reported.
    breaker_tripped_at: Option<(Instant, DateTime<Utc>)>,
    /// Whether the warning threshold crossing has already been logged
    /// this month.
    warned_this_month: bool,
    records_since_save: u64,
}

impl QuotaState {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            monthly_count: 0,
            daily_count: 0,
            current_year: now.year(),
            current_month: now.month(),
            current_day: now.day(),
            breaker_tripped_at: None,
            warned_this_month: false,
            records_since_save: 0,
        }
    }
}

/// Point-in-time quota status for logging and alerting.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub monthly_used: u64,
    pub monthly_cap: u64,
    pub monthly_pct: f64,
    pub daily_used: u64,
    pub daily_cap: u64,
    pub daily_pct: f64,
    /// Calendar days left in the current month, including today.
    pub days_remaining: u32,
    /// Remaining monthly quota spread over the remaining days.
    pub daily_budget: f64,
    pub breaker_tripped: bool,
    pub breaker_trip_time: Option<DateTime<Utc>>,
}

/// Tracks consumption against monthly and daily quota caps.
///
/// Admission fails when the circuit breaker is tripped and its cool-down has
/// not elapsed, or when either counter has reached its cap. Crossing the
/// emergency usage ratio trips the breaker even when admission would
/// otherwise succeed; crossing the warning ratio only logs.
///
/// Counters reset exactly once per calendar period transition, detected by
/// comparing the current period against the last-seen period. All state is
/// guarded by a single internal mutex; lock scope is short-lived and never
/// spans an outbound call.
pub struct QuotaTracker {
    settings: QuotaSettings,
    inner: Mutex<QuotaState>,
}

impl QuotaTracker {
    /// Creates a tracker, restoring a persisted snapshot when one exists
    /// and belongs to the current calendar period.
    pub fn new(settings: QuotaSettings) -> Self {
        let now = Utc::now();
        let mut state = QuotaState::fresh(now);

        if let Some(path) = &settings.persist_path {
            match QuotaSnapshot::load(path) {
                Ok(Some(snapshot)) => {
                    snapshot.restore_into(
                        now,
                        settings.breaker_cooldown,
                        &mut state.monthly_count,
                        &mut state.daily_count,
                        &mut state.breaker_tripped_at,
                    );
                    info!(
                        monthly = state.monthly_count,
                        daily = state.daily_count,
                        breaker_tripped = state.breaker_tripped_at.is_some(),
                        "Restored quota snapshot"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Failed to load quota snapshot, starting fresh");
                }
            }
        }

        Self {
            settings,
            inner: Mutex::new(state),
        }
    }

    /// Checks whether one more billable request may be admitted.
    ///
    /// This call can mutate state: it performs calendar rollovers, releases
    /// an expired breaker trip, and trips the breaker when the emergency
    /// threshold is crossed.
    pub fn check_admission(&self) -> bool {
        self.check_admission_at(Utc::now())
    }

    fn check_admission_at(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.inner.lock().unwrap();
        self.roll_over(&mut state, now);

        if let Some((tripped_at, trip_time)) = state.breaker_tripped_at {
            if tripped_at.elapsed() >= self.settings.breaker_cooldown {
                warn!(
                    tripped_since = %trip_time,
                    "Circuit breaker cool-down elapsed, releasing"
                );
                state.breaker_tripped_at = None;
            } else {
                return false;
            }
        }

        if state.monthly_count >= self.settings.monthly_quota {
            error!(
                used = state.monthly_count,
                cap = self.settings.monthly_quota,
                "Monthly quota exceeded"
            );
            return false;
        }

        if state.daily_count >= self.settings.daily_quota {
            error!(
                used = state.daily_count,
                cap = self.settings.daily_quota,
                "Daily quota exceeded"
            );
            return false;
        }

        let monthly_ratio = state.monthly_count as f64 / self.settings.monthly_quota as f64;

        if self.settings.circuit_breaker_enabled && monthly_ratio >= self.settings.emergency_threshold
        {
            error!(
                pct = format!("{:.1}%", monthly_ratio * 100.0),
                threshold = format!("{:.0}%", self.settings.emergency_threshold * 100.0),
                "Emergency quota threshold crossed, tripping circuit breaker"
            );
            state.breaker_tripped_at = Some((Instant::now(), now));
            self.save_snapshot(&state);
            return false;
        }

        if monthly_ratio >= self.settings.warning_threshold && !state.warned_this_month {
            warn!(
                pct = format!("{:.1}%", monthly_ratio * 100.0),
                threshold = format!("{:.0}%", self.settings.warning_threshold * 100.0),
                "Quota warning threshold crossed"
            );
            state.warned_this_month = true;
        }

        true
    }

    /// Records `count` billable requests against both counters.
    ///
    /// Batch calls count once per item; single logical calls count once.
    pub fn record_usage(&self, count: u64) {
        self.record_usage_at(count, Utc::now());
    }

    fn record_usage_at(&self, count: u64, now: DateTime<Utc>) {
        let mut state = self.inner.lock().unwrap();
        self.roll_over(&mut state, now);

        state.monthly_count += count;
        state.daily_count += count;
        state.records_since_save += count;

        if count > 1 {
            info!(
                count,
                monthly = state.monthly_count,
                daily = state.daily_count,
                "Recorded batch usage"
            );
        }

        if state.records_since_save >= PERSIST_EVERY {
            state.records_since_save = 0;
            self.save_snapshot(&state);
        }
    }

    /// Returns the current quota status.
    pub fn status(&self) -> QuotaStatus {
        self.status_at(Utc::now())
    }

    fn status_at(&self, now: DateTime<Utc>) -> QuotaStatus {
        let mut state = self.inner.lock().unwrap();
        self.roll_over(&mut state, now);

        let days_remaining = days_remaining_in_month(now);
        let remaining = self.settings.monthly_quota.saturating_sub(state.monthly_count);

        QuotaStatus {
            monthly_used: state.monthly_count,
            monthly_cap: self.settings.monthly_quota,
            monthly_pct: state.monthly_count as f64 / self.settings.monthly_quota as f64 * 100.0,
            daily_used: state.daily_count,
            daily_cap: self.settings.daily_quota,
            daily_pct: state.daily_count as f64 / self.settings.daily_quota as f64 * 100.0,
            days_remaining,
            daily_budget: remaining as f64 / days_remaining.max(1) as f64,
            breaker_tripped: state.breaker_tripped_at.is_some(),
            breaker_trip_time: state.breaker_tripped_at.map(|(_, t)| t),
        }
    }

    /// Writes the current state to the configured snapshot path, if any.
    pub fn persist(&self) {
        let state = self.inner.lock().unwrap();
        self.save_snapshot(&state);
    }

    /// Resets counters whose calendar period has rolled over.
    ///
    /// A month rollover also clears a breaker trip, since the trip was
    /// driven by the now-reset monthly counter. Applying the same rollover
    /// twice is a no-op the second time.
    fn roll_over(&self, state: &mut QuotaState, now: DateTime<Utc>) {
        let mut rolled = false;

        if now.year() != state.current_year || now.month() != state.current_month {
            info!(
                previous = format!("{}-{:02}", state.current_year, state.current_month),
                current = format!("{}-{:02}", now.year(), now.month()),
                "New month detected, resetting monthly quota counter"
            );
            state.monthly_count = 0;
            state.current_year = now.year();
            state.current_month = now.month();
            state.warned_this_month = false;
            if state.breaker_tripped_at.take().is_some() {
                info!("Circuit breaker released by month rollover");
            }
            rolled = true;
        }

        if now.day() != state.current_day {
            info!(
                previous = state.current_day,
                current = now.day(),
                "New day detected, resetting daily quota counter"
            );
            state.daily_count = 0;
            state.current_day = now.day();
            rolled = true;
        }

        if rolled {
            self.save_snapshot(state);
        }
    }

    fn save_snapshot(&self, state: &QuotaState) {
        let Some(path) = &self.settings.persist_path else {
            return;
        };
        let snapshot = QuotaSnapshot {
            monthly_count: state.monthly_count,
            daily_count: state.daily_count,
            year: state.current_year,
            month: state.current_month,
            day: state.current_day,
            breaker_trip_time: state.breaker_tripped_at.map(|(_, t)| t),
            saved_at: Utc::now(),
        };
        if let Err(e) = snapshot.save(path) {
            error!(path = %path.display(), error = %e, "Failed to save quota snapshot");
        }
    }
}

impl std::fmt::Debug for QuotaTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaTracker")
            .field("settings", &self.settings)
            .field("inner", &self.inner)
            .finish()
    }
}

/// Days left in the month of `now`, including today.
fn days_remaining_in_month(now: DateTime<Utc>) -> u32 {
    let (next_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    // First day of next month always exists.
    let month_end = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap_or_else(|| now.date_naive())
        .pred_opt()
        .unwrap_or_else(|| now.date_naive());

    (month_end.day() - now.day()) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn tracker(monthly: u64, daily: u64) -> QuotaTracker {
        QuotaTracker::new(QuotaSettings {
            monthly_quota: monthly,
            daily_quota: daily,
            ..Default::default()
        })
    }

    fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_admission_under_quota() {
        let tracker = tracker(100, 50);
        assert!(tracker.check_admission());
        tracker.record_usage(1);
        assert!(tracker.check_admission());
    }

    #[test]
    fn test_daily_cap_blocks_admission() {
        let tracker = tracker(1000, 3);
        tracker.record_usage(3);
        assert!(!tracker.check_admission());
        let status = tracker.status();
        assert_eq!(status.daily_used, 3);
        assert!(status.daily_used <= status.daily_cap);
    }

    #[test]
    fn test_monthly_cap_blocks_admission() {
        let tracker = tracker(5, 1000);
        tracker.record_usage(5);
        assert!(!tracker.check_admission());
    }

    #[test]
    fn test_counters_never_exceed_caps_after_denial() {
        let tracker = tracker(10, 10);
        for _ in 0..20 {
            if tracker.check_admission() {
                tracker.record_usage(1);
            }
        }
        let status = tracker.status();
        assert!(status.monthly_used <= status.monthly_cap);
        assert!(status.daily_used <= status.daily_cap);
    }

    #[test]
    fn test_emergency_threshold_trips_breaker() {
        let tracker = QuotaTracker::new(QuotaSettings {
            monthly_quota: 100,
            daily_quota: 1000,
            emergency_threshold: 0.95,
            breaker_cooldown: Duration::from_secs(3600),
            ..Default::default()
        });

        tracker.record_usage(95);
        // First check crosses the threshold and trips.
        assert!(!tracker.check_admission());
        assert!(tracker.status().breaker_tripped);
        // Every subsequent check is rejected while the cool-down runs.
        assert!(!tracker.check_admission());
    }

    #[test]
    fn test_breaker_releases_after_cooldown() {
        let tracker = QuotaTracker::new(QuotaSettings {
            monthly_quota: 100,
            daily_quota: 1000,
            emergency_threshold: 0.5,
            breaker_cooldown: Duration::from_millis(20),
            ..Default::default()
        });

        tracker.record_usage(50);
        assert!(!tracker.check_admission());
        assert!(tracker.status().breaker_tripped);

        std::thread::sleep(Duration::from_millis(30));
        // Cool-down elapsed; breaker releases, but the emergency ratio still
        // holds, so the breaker immediately re-trips and admission fails.
        assert!(!tracker.check_admission());
    }

    #[test]
    fn test_breaker_release_readmits_below_threshold() {
        let tracker = QuotaTracker::new(QuotaSettings {
            monthly_quota: 100,
            daily_quota: 1000,
            emergency_threshold: 0.95,
            breaker_cooldown: Duration::from_millis(20),
            ..Default::default()
        });

        tracker.record_usage(95);
        assert!(!tracker.check_admission());

        std::thread::sleep(Duration::from_millis(30));
        // Simulate a month rollover so usage is back below the threshold.
        assert!(tracker.check_admission_at(date(2026, 9, 1)));
    }

    #[test]
    fn test_month_rollover_resets_monthly_only() {
        let tracker = tracker(1000, 500);
        tracker.record_usage_at(10, date(2026, 8, 24));

        // Same day number in the next month: daily counter survives, the
        // monthly counter resets.
        assert!(tracker.check_admission_at(date(2026, 9, 24)));
        let status = tracker.status_at(date(2026, 9, 24));
        assert_eq!(status.monthly_used, 0);
        assert_eq!(status.daily_used, 10);
    }

    #[test]
    fn test_day_rollover_resets_daily_only() {
        let tracker = tracker(1000, 500);
        tracker.record_usage_at(10, date(2026, 8, 24));

        let status = tracker.status_at(date(2026, 8, 25));
        assert_eq!(status.daily_used, 0);
        assert_eq!(status.monthly_used, 10);
    }

    #[test]
    fn test_rollover_is_idempotent() {
        let tracker = tracker(1000, 500);
        tracker.record_usage_at(10, date(2026, 8, 24));

        let first = tracker.status_at(date(2026, 9, 1));
        let second = tracker.status_at(date(2026, 9, 1));
        assert_eq!(first.monthly_used, second.monthly_used);
        assert_eq!(first.daily_used, second.daily_used);
    }

    #[test]
    fn test_month_rollover_clears_breaker() {
        let tracker = QuotaTracker::new(QuotaSettings {
            monthly_quota: 100,
            daily_quota: 1000,
            emergency_threshold: 0.5,
            breaker_cooldown: Duration::from_secs(3600),
            ..Default::default()
        });
        tracker.record_usage(60);
        assert!(!tracker.check_admission());
        assert!(tracker.status().breaker_tripped);

        assert!(tracker.check_admission_at(date(2026, 9, 1)));
        assert!(!tracker.status().breaker_tripped);
    }

    #[test]
    fn test_status_daily_budget() {
        let tracker = tracker(300, 100);
        tracker.record_usage_at(100, date(2026, 8, 22));

        let status = tracker.status_at(date(2026, 8, 22));
        // 10 days left in August including the 22nd.
        assert_eq!(status.days_remaining, 10);
        assert!((status.daily_budget - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_days_remaining_in_december() {
        let now = date(2026, 12, 31);
        assert_eq!(days_remaining_in_month(now), 1);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quota.json");

        let settings = QuotaSettings {
            monthly_quota: 1000,
            daily_quota: 500,
            persist_path: Some(path.clone()),
            ..Default::default()
        };

        let tracker = QuotaTracker::new(settings.clone());
        tracker.record_usage(42);
        tracker.persist();

        let restored = QuotaTracker::new(settings);
        let status = restored.status();
        assert_eq!(status.monthly_used, 42);
        assert_eq!(status.daily_used, 42);
    }
}
