//! Scheduler run statistics.

use serde::Serialize;

/// Snapshot of scheduler activity, suitable for logging or the status
/// surface.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    /// Seconds since the scheduler run started.
    pub runtime_secs: f64,
    /// Tasks accepted by `schedule`.
    pub scheduled: u64,
    /// Tasks completed successfully.
    pub completed: u64,
    /// Tasks terminally failed (validation/application errors).
    pub failed: u64,
    /// Tasks abandoned after exhausting their retry budget.
    pub abandoned: u64,
    /// Re-enqueues after recoverable failures.
    pub retried: u64,
    /// Times the pool entered the outage pause.
    pub pauses: u64,
    /// completed / (completed + failed + abandoned), 1.0 when nothing
    /// finished yet.
    pub success_rate: f64,
    pub queue_depth: usize,
    pub active_workers: usize,
    /// Whether the pool is currently pause-gated.
    pub paused: bool,
    /// Seconds until the pause gate lifts, when paused.
    pub pause_remaining_secs: Option<f64>,
    /// Consecutive network failures across all workers.
    pub consecutive_failures: u32,
}

impl SchedulerStats {
    pub(crate) fn compute_success_rate(completed: u64, failed: u64, abandoned: u64) -> f64 {
        let finished = completed + failed + abandoned;
        if finished == 0 {
            1.0
        } else {
            completed as f64 / finished as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_with_no_finished_tasks() {
        assert_eq!(SchedulerStats::compute_success_rate(0, 0, 0), 1.0);
    }

    #[test]
    fn test_success_rate_counts_abandoned_as_failures() {
        assert_eq!(SchedulerStats::compute_success_rate(3, 0, 1), 0.75);
    }
}
