//! Operational status surface.
//!
//! [`StatusSnapshot`] composes the trackers' individual reports into one
//! serializable document for logging, alerting, and the CLI. It is a
//! read-only surface; nothing in the core consumes it.

use crate::outage::{FailureDetector, FailurePattern, NetworkStatus};
use crate::quota::{QuotaStatus, QuotaTracker};
use crate::session::{SessionPool, SessionPoolStats};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of the whole collection stack.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub taken_at: DateTime<Utc>,
    pub quota: QuotaStatus,
    pub sessions: SessionPoolStats,
    pub network_status: NetworkStatus,
    pub failure_pattern: FailurePattern,
}

impl StatusSnapshot {
    /// Collects a snapshot from the shared trackers.
    pub fn collect(
        quota: &QuotaTracker,
        sessions: &SessionPool,
        detector: &FailureDetector,
    ) -> Self {
        Self {
            taken_at: Utc::now(),
            quota: quota.status(),
            sessions: sessions.stats(),
            network_status: detector.status(),
            failure_pattern: detector.failure_pattern(),
        }
    }

    /// One-line summary for log output.
    pub fn summary(&self) -> String {
        format!(
            "quota {:.1}% monthly / {:.1}% daily, {} sessions, network {}",
            self.quota.monthly_pct,
            self.quota.daily_pct,
            self.sessions.active_sessions,
            self.network_status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutageSettings, QuotaSettings, SessionSettings};

    fn stack() -> (QuotaTracker, SessionPool, FailureDetector) {
        (
            QuotaTracker::new(QuotaSettings::default()),
            SessionPool::new(SessionSettings::default()),
            FailureDetector::new(OutageSettings::default()),
        )
    }

    #[test]
    fn test_snapshot_reflects_tracker_state() {
        let (quota, sessions, detector) = stack();
        quota.record_usage(10);
        sessions.session_for("search").unwrap();

        let snapshot = StatusSnapshot::collect(&quota, &sessions, &detector);
        assert_eq!(snapshot.quota.monthly_used, 10);
        assert_eq!(snapshot.sessions.active_sessions, 1);
        assert_eq!(snapshot.network_status, NetworkStatus::Normal);
    }

    #[test]
    fn test_snapshot_serializes() {
        let (quota, sessions, detector) = stack();
        let snapshot = StatusSnapshot::collect(&quota, &sessions, &detector);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("quota").is_some());
        assert!(json.get("network_status").is_some());
    }

    #[test]
    fn test_summary_mentions_network_state() {
        let (quota, sessions, detector) = stack();
        let snapshot = StatusSnapshot::collect(&quota, &sessions, &detector);
        assert!(snapshot.summary().contains("network normal"));
    }
}
