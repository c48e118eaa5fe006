//! Error types for the collection core.

use thiserror::Error;

/// Errors that can occur during orchestrated collection work.
///
/// Quota and lease errors are expected, frequent outcomes on the hot path
/// and are never retried by the request executor. Network errors are retried
/// locally with backoff; an exhausted retry budget surfaces as either
/// [`ScrapeError::Network`] or [`ScrapeError::OutageDetected`] depending on
/// the failure detector's classification.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The daily or monthly API quota has been exhausted, or the circuit
    /// breaker is currently tripped.
    #[error("API quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The supplied session lease is past its lifetime or request cap.
    #[error("Session {0} has expired or is invalid")]
    SessionExpired(String),

    /// The session pool is at capacity and no expired lease could be evicted.
    #[error("Maximum session limit reached: {0}")]
    SessionLimitExceeded(usize),

    /// An outbound request failed after exhausting its retry budget.
    #[error("Network error: {0}")]
    Network(String),

    /// The failure pattern indicates a sustained outage rather than an
    /// isolated network fault.
    #[error("Outage detected: {0}")]
    OutageDetected(String),

    /// Malformed task parameters. Terminal for the task, never retried.
    #[error("Invalid task parameters: {0}")]
    Validation(String),

    /// A collaborator-internal fault. Terminal for the task, never retried.
    #[error("Marketplace error: {0}")]
    Application(String),
}

impl ScrapeError {
    /// Whether the scheduler may re-enqueue a task that failed with this error.
    ///
    /// Validation and application errors are terminal; everything else can be
    /// retried later, possibly at reduced priority.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ScrapeError::Validation(_) | ScrapeError::Application(_)
        )
    }

    /// Short condition tag used in failure records and log fields.
    pub fn condition(&self) -> &'static str {
        match self {
            ScrapeError::QuotaExceeded(_) => "quota_exceeded",
            ScrapeError::SessionExpired(_) => "session_expired",
            ScrapeError::SessionLimitExceeded(_) => "session_limit_exceeded",
            ScrapeError::Network(_) => "network_error",
            ScrapeError::OutageDetected(_) => "outage_detected",
            ScrapeError::Validation(_) => "validation_error",
            ScrapeError::Application(_) => "application_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors_are_not_retryable() {
        assert!(!ScrapeError::Validation("missing keyword".into()).is_retryable());
        assert!(!ScrapeError::Application("parser panic".into()).is_retryable());
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(ScrapeError::Network("connection reset".into()).is_retryable());
        assert!(ScrapeError::OutageDetected("rapid failures".into()).is_retryable());
        assert!(ScrapeError::QuotaExceeded("daily cap".into()).is_retryable());
        assert!(ScrapeError::SessionExpired("sess-1".into()).is_retryable());
    }

    #[test]
    fn test_condition_tags() {
        assert_eq!(
            ScrapeError::Network("timeout".into()).condition(),
            "network_error"
        );
        assert_eq!(
            ScrapeError::OutageDetected("pattern".into()).condition(),
            "outage_detected"
        );
    }
}
