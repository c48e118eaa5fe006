//! Adaptive resilience policy.
//!
//! Maps the current [`NetworkStatus`] to the retry/backoff/timeout/cache
//! parameter bundle used by the request executor, scaling each upward as
//! network health worsens. A milder bump applies when a scheduled outage is
//! imminent but not yet active.

use super::detector::NetworkStatus;
use crate::config::ExecutorSettings;
use std::time::Duration;

/// Resilience parameters for one logical outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceParams {
    /// Retry attempts after the initial attempt.
    pub retries: u32,
    /// Exponential backoff factor between attempts.
    pub backoff_factor: f64,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Multiplier applied to cache entry TTLs.
    pub cache_ttl_multiplier: f64,
    /// Extra random delay range injected between attempts during outages.
    pub outage_delay: Option<(Duration, Duration)>,
}

/// Derives request parameters from the network health classification.
#[derive(Debug, Clone)]
pub struct AdaptivePolicy {
    base: ExecutorSettings,
}

impl AdaptivePolicy {
    /// Creates a policy around the configured baseline parameters.
    pub fn new(base: ExecutorSettings) -> Self {
        Self { base }
    }

    /// Returns the parameter bundle for the given status.
    ///
    /// `outage_soon` marks an upcoming scheduled outage window; it only
    /// matters while the status is still normal.
    pub fn params_for(&self, status: NetworkStatus, outage_soon: bool) -> ResilienceParams {
        let base = &self.base;
        match status {
            NetworkStatus::Normal if outage_soon => ResilienceParams {
                retries: scale_retries(base.base_retries, 1.5),
                backoff_factor: base.base_backoff_factor * 1.2,
                timeout: base.base_timeout.mul_f64(1.5),
                cache_ttl_multiplier: 1.0,
                outage_delay: None,
            },
            NetworkStatus::Normal => ResilienceParams {
                retries: base.base_retries,
                backoff_factor: base.base_backoff_factor,
                timeout: base.base_timeout,
                cache_ttl_multiplier: 1.0,
                outage_delay: None,
            },
            NetworkStatus::Degraded => ResilienceParams {
                retries: scale_retries(base.base_retries, 1.5),
                backoff_factor: base.base_backoff_factor * 1.25,
                timeout: base.base_timeout.mul_f64(1.5),
                cache_ttl_multiplier: 1.0,
                outage_delay: None,
            },
            NetworkStatus::OutageSuspected => ResilienceParams {
                retries: scale_retries(base.base_retries, 2.0),
                backoff_factor: base.base_backoff_factor * 1.5,
                timeout: base.base_timeout.mul_f64(2.0),
                cache_ttl_multiplier: 2.0,
                outage_delay: Some((Duration::from_secs(3), Duration::from_secs(10))),
            },
            NetworkStatus::OutageConfirmed => ResilienceParams {
                retries: scale_retries(base.base_retries, 2.0),
                backoff_factor: base.base_backoff_factor * 2.0,
                timeout: base.base_timeout.mul_f64(3.0),
                cache_ttl_multiplier: 2.0,
                outage_delay: Some((Duration::from_secs(3), Duration::from_secs(10))),
            },
        }
    }

    /// Effective cache TTL for the given status.
    pub fn cache_ttl_for(&self, status: NetworkStatus) -> Duration {
        let multiplier = self.params_for(status, false).cache_ttl_multiplier;
        self.base.base_cache_ttl.mul_f64(multiplier)
    }
}

fn scale_retries(base: u32, factor: f64) -> u32 {
    (base as f64 * factor).round() as u32
}
