//! Configuration for the collection core.
//!
//! Each component has its own settings struct with defaults matching the
//! production deployment. [`CoreSettings`] bundles them for callers that
//! construct the full stack.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default monthly request quota.
pub const DEFAULT_MONTHLY_QUOTA: u64 = 82_000;

/// Default daily request quota (~monthly / 30).
pub const DEFAULT_DAILY_QUOTA: u64 = 2_700;

/// Default circuit breaker cool-down after an emergency trip.
pub const DEFAULT_BREAKER_COOLDOWN: Duration = Duration::from_secs(3 * 3600);

/// Default session lifetime imposed by the upstream proxy provider.
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(600);

/// Default pool-wide pause after an outage classification.
pub const DEFAULT_OUTAGE_PAUSE: Duration = Duration::from_secs(2 * 3600);

/// Settings for the quota tracker.
#[derive(Debug, Clone)]
pub struct QuotaSettings {
    /// Monthly request cap.
    pub monthly_quota: u64,
    /// Daily request cap.
    pub daily_quota: u64,
    /// Monthly usage ratio that trips the circuit breaker (0.0-1.0).
    pub emergency_threshold: f64,
    /// Monthly usage ratio that emits a warning (0.0-1.0).
    pub warning_threshold: f64,
    /// How long the breaker rejects admission after a trip.
    pub breaker_cooldown: Duration,
    /// Whether the emergency circuit breaker is active.
    pub circuit_breaker_enabled: bool,
    /// Optional path for the persisted quota snapshot.
    pub persist_path: Option<PathBuf>,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            monthly_quota: DEFAULT_MONTHLY_QUOTA,
            daily_quota: DEFAULT_DAILY_QUOTA,
            emergency_threshold: 0.95,
            warning_threshold: 0.80,
            breaker_cooldown: DEFAULT_BREAKER_COOLDOWN,
            circuit_breaker_enabled: true,
            persist_path: None,
        }
    }
}

/// Settings for the session pool.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Maximum lease lifetime before a session becomes invalid.
    pub max_lifetime: Duration,
    /// Maximum number of concurrently tracked sessions.
    pub max_sessions: usize,
    /// Maximum requests a single session may carry.
    pub max_requests_per_session: u32,
    /// Minimum interval between opportunistic eviction passes.
    pub cleanup_interval: Duration,
    /// Prefix for generated session identifiers.
    pub session_prefix: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_lifetime: DEFAULT_SESSION_LIFETIME,
            max_sessions: 50,
            max_requests_per_session: 100,
            cleanup_interval: Duration::from_secs(60),
            session_prefix: "shelf_".to_string(),
        }
    }
}

/// Settings for the failure detector and outage feed.
#[derive(Debug, Clone)]
pub struct OutageSettings {
    /// Number of failures needed before the pattern is evaluated.
    pub failure_threshold: usize,
    /// Size of the rolling failure window.
    pub window_size: usize,
    /// Inter-failure interval below which failures count as rapid.
    pub rapid_fail_interval: Duration,
    /// How long after the last failure a suspected outage stays current.
    pub suspicion_lifetime: Duration,
    /// Minimum interval between polls of the external status feed.
    pub feed_poll_interval: Duration,
    /// Feed responses older than this are treated as stale.
    pub feed_staleness: Duration,
    /// Area identifiers to monitor for scheduled outage windows.
    pub monitored_areas: Vec<String>,
}

impl Default for OutageSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_size: 20,
            rapid_fail_interval: Duration::from_secs(10),
            suspicion_lifetime: Duration::from_secs(600),
            feed_poll_interval: Duration::from_secs(300),
            feed_staleness: Duration::from_secs(600),
            monitored_areas: Vec::new(),
        }
    }
}

/// Settings for the request executor's baseline resilience parameters.
///
/// These are the "normal conditions" values; the adaptive policy scales
/// them upward as network status worsens.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Base retry attempts per logical call.
    pub base_retries: u32,
    /// Base exponential backoff factor.
    pub base_backoff_factor: f64,
    /// Base per-call timeout.
    pub base_timeout: Duration,
    /// Base TTL for cached responses.
    pub base_cache_ttl: Duration,
    /// Optional directory for persisted cache entries.
    pub cache_dir: Option<PathBuf>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            base_retries: 3,
            base_backoff_factor: 1.5,
            base_timeout: Duration::from_secs(60),
            base_cache_ttl: Duration::from_secs(3600),
            cache_dir: None,
        }
    }
}

/// Settings for the task scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Number of concurrent workers in the pool.
    pub concurrency: usize,
    /// Pool-wide minimum interval between task dequeues.
    pub task_interval: Duration,
    /// Consecutive network failures before the pool assumes an outage.
    pub failure_threshold: u32,
    /// How long the pool stays paused after an outage classification.
    pub outage_pause: Duration,
    /// Retry budget per task before it is abandoned.
    pub max_task_retries: u32,
    /// Idle sleep used by workers while the pool is paused or the queue
    /// is momentarily empty.
    pub idle_sleep: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            task_interval: Duration::from_secs(1),
            failure_threshold: 5,
            outage_pause: DEFAULT_OUTAGE_PAUSE,
            max_task_retries: 5,
            idle_sleep: Duration::from_millis(100),
        }
    }
}

/// Bundled settings for the full collection stack.
#[derive(Debug, Clone, Default)]
pub struct CoreSettings {
    pub quota: QuotaSettings,
    pub session: SessionSettings,
    pub outage: OutageSettings,
    pub executor: ExecutorSettings,
    pub scheduler: SchedulerSettings,
}

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid threshold {name}: {value} (must be within 0.0..=1.0)")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Invalid setting {name}: must be greater than zero")]
    MustBePositive { name: &'static str },

    #[error("Failure threshold {threshold} exceeds window size {window}")]
    ThresholdExceedsWindow { threshold: usize, window: usize },
}

impl CoreSettings {
    /// Validates cross-field invariants that defaults always satisfy but
    /// operator-supplied values may not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("emergency_threshold", self.quota.emergency_threshold),
            ("warning_threshold", self.quota.warning_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if self.quota.monthly_quota == 0 {
            return Err(ConfigError::MustBePositive {
                name: "monthly_quota",
            });
        }
        if self.quota.daily_quota == 0 {
            return Err(ConfigError::MustBePositive { name: "daily_quota" });
        }
        if self.session.max_sessions == 0 {
            return Err(ConfigError::MustBePositive {
                name: "max_sessions",
            });
        }
        if self.session.max_requests_per_session == 0 {
            return Err(ConfigError::MustBePositive {
                name: "max_requests_per_session",
            });
        }
        if self.scheduler.concurrency == 0 {
            return Err(ConfigError::MustBePositive { name: "concurrency" });
        }
        if self.outage.failure_threshold > self.outage.window_size {
            return Err(ConfigError::ThresholdExceedsWindow {
                threshold: self.outage.failure_threshold,
                window: self.outage.window_size,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(CoreSettings::default().validate().is_ok());
    }

    #[test]
    fn test_default_quota_values() {
        let settings = QuotaSettings::default();
        assert_eq!(settings.monthly_quota, 82_000);
        assert_eq!(settings.daily_quota, 2_700);
        assert_eq!(settings.emergency_threshold, 0.95);
        assert_eq!(settings.warning_threshold, 0.80);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut settings = CoreSettings::default();
        settings.quota.emergency_threshold = 1.5;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut settings = CoreSettings::default();
        settings.scheduler.concurrency = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MustBePositive { name: "concurrency" })
        ));
    }

    #[test]
    fn test_threshold_must_fit_window() {
        let mut settings = CoreSettings::default();
        settings.outage.failure_threshold = 30;
        settings.outage.window_size = 20;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ThresholdExceedsWindow { .. })
        ));
    }
}
