//! Failure-pattern detector for sustained network outages.
//!
//! # Classification
//!
//! The detector keeps a ring buffer of the most recent failures. Once at
//! least `failure_threshold` failures are present, the most recent
//! `failure_threshold` of them are examined:
//!
//! - all inter-failure intervals below the rapid-fail bound, AND
//! - failures spanning at least 2 distinct targets (ruling out a single
//!   broken endpoint)
//!
//! Both true ⇒ outage suspected. Rapid failures against a single target
//! only degrade the status. An authoritative external feed observation,
//! while fresh, overrides the local pattern entirely in either direction.

use crate::config::OutageSettings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Current network health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NetworkStatus {
    /// No anomalous failure pattern.
    Normal,
    /// Rapid failures observed, but confined to a single target.
    Degraded,
    /// The local failure pattern matches a correlated outage.
    OutageSuspected,
    /// The external feed reports an active outage stage.
    OutageConfirmed,
}

impl NetworkStatus {
    /// Whether request volume should be reduced at this status.
    pub fn is_outage(&self) -> bool {
        matches!(
            self,
            NetworkStatus::OutageSuspected | NetworkStatus::OutageConfirmed
        )
    }
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Degraded => write!(f, "degraded"),
            Self::OutageSuspected => write!(f, "outage-suspected"),
            Self::OutageConfirmed => write!(f, "outage-confirmed"),
        }
    }
}

/// Summary of the current failure window, for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct FailurePattern {
    pub failures: usize,
    pub threshold: usize,
    pub window_size: usize,
    pub distinct_targets: usize,
    pub last_failure_age_secs: Option<f64>,
}

/// A cached observation from the external status feed.
#[derive(Debug, Clone, Copy)]
struct FeedObservation {
    observed_at: Instant,
    stage: u8,
}

#[derive(Debug)]
struct DetectorState {
    /// Most recent failures, oldest first. Bounded by `window_size`.
    window: VecDeque<(Instant, String)>,
    local_status: NetworkStatus,
    feed: Option<FeedObservation>,
    next_outage: Option<DateTime<Utc>>,
}

/// Observes request outcomes and classifies current network health.
pub struct FailureDetector {
    settings: OutageSettings,
    inner: Mutex<DetectorState>,
}

impl FailureDetector {
    /// Creates a detector with an empty window.
    pub fn new(settings: OutageSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(DetectorState {
                window: VecDeque::new(),
                local_status: NetworkStatus::Normal,
                feed: None,
                next_outage: None,
            }),
        }
    }

    /// Records a failed call against `target` and returns the resulting
    /// classification.
    pub fn record_failure(&self, target: &str) -> NetworkStatus {
        let mut state = self.inner.lock().unwrap();

        state.window.push_back((Instant::now(), target.to_string()));
        while state.window.len() > self.settings.window_size {
            state.window.pop_front();
        }

        if state.window.len() >= self.settings.failure_threshold {
            let recent: Vec<&(Instant, String)> = state
                .window
                .iter()
                .rev()
                .take(self.settings.failure_threshold)
                .collect();

            let rapid = recent.windows(2).all(|pair| {
                // recent is newest-first, so pair[0] is the later failure.
                pair[0].0.duration_since(pair[1].0) < self.settings.rapid_fail_interval
            });

            let mut targets: Vec<&str> = recent.iter().map(|(_, t)| t.as_str()).collect();
            targets.sort_unstable();
            targets.dedup();
            let diverse = targets.len() >= 2;

            if rapid && diverse {
                if state.local_status != NetworkStatus::OutageSuspected {
                    warn!(
                        failures = state.window.len(),
                        distinct_targets = targets.len(),
                        "Possible outage detected from failure pattern"
                    );
                }
                state.local_status = NetworkStatus::OutageSuspected;
            } else if rapid {
                debug!(
                    failures = state.window.len(),
                    "Rapid failures confined to a single target"
                );
                state.local_status = NetworkStatus::Degraded;
            }
        }

        Self::effective_status(&self.settings, &state)
    }

    /// Records a successful call.
    ///
    /// Clears a locally suspected or degraded state but leaves the failure
    /// window intact; a feed-confirmed outage is not affected.
    pub fn record_success(&self) {
        let mut state = self.inner.lock().unwrap();
        if matches!(
            state.local_status,
            NetworkStatus::OutageSuspected | NetworkStatus::Degraded
        ) {
            info!("Successful call, clearing suspected outage state");
            state.local_status = NetworkStatus::Normal;
        }
    }

    /// Explicitly clears the failure window and local classification.
    pub fn reset(&self) {
        let mut state = self.inner.lock().unwrap();
        state.window.clear();
        state.local_status = NetworkStatus::Normal;
    }

    /// Returns the current classification.
    pub fn status(&self) -> NetworkStatus {
        let state = self.inner.lock().unwrap();
        Self::effective_status(&self.settings, &state)
    }

    /// Stores a fresh observation from the external feed.
    pub fn apply_feed_stage(&self, stage: u8) {
        let mut state = self.inner.lock().unwrap();
        if stage > 0 {
            warn!(stage, "Outage confirmed by external status feed");
        } else {
            debug!("External status feed reports no outage");
        }
        state.feed = Some(FeedObservation {
            observed_at: Instant::now(),
            stage,
        });
    }

    /// Stores the next scheduled outage window start, from the feed's area
    /// schedules.
    pub fn set_next_outage(&self, start: Option<DateTime<Utc>>) {
        let mut state = self.inner.lock().unwrap();
        if let Some(at) = start {
            info!(start = %at, "Next scheduled outage window recorded");
        }
        state.next_outage = start;
    }

    /// Whether a scheduled outage window starts within `lookahead`.
    pub fn is_outage_expected_soon(&self, lookahead: chrono::Duration) -> bool {
        let state = self.inner.lock().unwrap();
        match state.next_outage {
            Some(start) => {
                let until = start - Utc::now();
                until >= chrono::Duration::zero() && until <= lookahead
            }
            None => false,
        }
    }

    /// Returns a summary of the failure window for the status surface.
    pub fn failure_pattern(&self) -> FailurePattern {
        let state = self.inner.lock().unwrap();

        let mut targets: Vec<&str> = state.window.iter().map(|(_, t)| t.as_str()).collect();
        targets.sort_unstable();
        targets.dedup();

        FailurePattern {
            failures: state.window.len(),
            threshold: self.settings.failure_threshold,
            window_size: self.settings.window_size,
            distinct_targets: targets.len(),
            last_failure_age_secs: state
                .window
                .back()
                .map(|(at, _)| at.elapsed().as_secs_f64()),
        }
    }

    /// Number of failures currently held in the window.
    pub fn window_len(&self) -> usize {
        self.inner.lock().unwrap().window.len()
    }

    fn effective_status(settings: &OutageSettings, state: &DetectorState) -> NetworkStatus {
        // A fresh feed observation is authoritative in both directions.
        if let Some(feed) = state.feed {
            if feed.observed_at.elapsed() < settings.feed_staleness {
                return if feed.stage > 0 {
                    NetworkStatus::OutageConfirmed
                } else {
                    NetworkStatus::Normal
                };
            }
        }

        // Local suspicion decays once failures stop arriving.
        if state.local_status == NetworkStatus::OutageSuspected {
            let recent = state
                .window
                .back()
                .map(|(at, _)| at.elapsed() < settings.suspicion_lifetime)
                .unwrap_or(false);
            if !recent {
                return NetworkStatus::Normal;
            }
        }

        state.local_status
    }
}

impl std::fmt::Debug for FailureDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureDetector")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
