//! The request executor.

use super::backoff::retry_delay;
use super::cache::ResponseCache;
use super::transport::{ScrapeRequest, ScrapeTransport};
use crate::error::ScrapeError;
use crate::outage::{AdaptivePolicy, FailureDetector};
use crate::quota::QuotaTracker;
use crate::session::{SessionId, SessionPool};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How far ahead a scheduled outage window counts as imminent.
const OUTAGE_LOOKAHEAD_MINUTES: i64 = 15;

/// Single choke point for outbound scraping calls.
///
/// Every call flows through the same pipeline: cache lookup, quota
/// admission, session lease, then the transport attempt loop with
/// backoff parameters drawn from the adaptive policy. Outcomes are
/// reported back to the quota tracker and failure detector, so the
/// pipeline self-adjusts as conditions change.
pub struct RequestExecutor<T: ScrapeTransport> {
    transport: T,
    quota: Arc<QuotaTracker>,
    sessions: Arc<SessionPool>,
    detector: Arc<FailureDetector>,
    policy: AdaptivePolicy,
    cache: ResponseCache,
}

impl<T: ScrapeTransport> RequestExecutor<T> {
    /// Creates an executor wired to the shared trackers.
    pub fn new(
        transport: T,
        quota: Arc<QuotaTracker>,
        sessions: Arc<SessionPool>,
        detector: Arc<FailureDetector>,
        policy: AdaptivePolicy,
        cache: ResponseCache,
    ) -> Self {
        Self {
            transport,
            quota,
            sessions,
            detector,
            policy,
            cache,
        }
    }

    /// Executes one logical scraping call.
    ///
    /// A cache hit returns immediately and consumes no quota. Otherwise the
    /// call must pass quota admission and hold a valid session lease before
    /// the first network attempt; both gates fail fast without retries.
    /// Transport failures are retried with backoff up to the policy's
    /// budget, and only network errors are retried.
    pub async fn execute(&self, request: &ScrapeRequest) -> Result<Value, ScrapeError> {
        let status = self.detector.status();
        let outage_soon = self
            .detector
            .is_outage_expected_soon(chrono::Duration::minutes(OUTAGE_LOOKAHEAD_MINUTES));
        let params = self.policy.params_for(status, outage_soon);

        let ttl = self.policy.cache_ttl_for(status);
        if let Some(payload) = self.cache.get(request, ttl) {
            debug!(url = %request.url, "Serving cached response");
            return Ok(payload);
        }

        if !self.quota.check_admission() {
            let quota = self.quota.status();
            warn!(
                monthly_used = quota.monthly_used,
                monthly_cap = quota.monthly_cap,
                daily_used = quota.daily_used,
                "Request rejected by quota"
            );
            return Err(ScrapeError::QuotaExceeded(format!(
                "quota exhausted ({}/{} monthly, {}/{} daily)",
                quota.monthly_used, quota.monthly_cap, quota.daily_used, quota.daily_cap
            )));
        }

        let session = self.resolve_session(request)?;
        let target = target_of(&request.url);

        let mut last_error = ScrapeError::Network("no attempts made".to_string());
        for attempt in 0..=params.retries {
            if attempt > 0 {
                let delay = retry_delay(attempt - 1, params.backoff_factor, params.outage_delay);
                debug!(
                    url = %request.url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }

            match self
                .transport
                .fetch(&request.url, session.as_ref(), &request.options, params.timeout)
                .await
            {
                Ok(payload) => {
                    self.quota.record_usage(1);
                    self.detector.record_success();
                    self.cache.put(request, payload.clone());
                    return Ok(payload);
                }
                Err(error @ ScrapeError::Network(_)) => {
                    let status = self.detector.record_failure(target);
                    warn!(
                        url = %request.url,
                        attempt,
                        network_status = %status,
                        error = %error,
                        "Attempt failed"
                    );
                    if status.is_outage() {
                        info!(url = %request.url, "Aborting retries, outage classified");
                        return Err(ScrapeError::OutageDetected(format!(
                            "outage classified while fetching {}",
                            request.url
                        )));
                    }
                    last_error = error;
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error)
    }

    /// Executes a batch of calls sequentially, collecting per-item results.
    pub async fn execute_batch(
        &self,
        requests: &[ScrapeRequest],
    ) -> Vec<Result<Value, ScrapeError>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.execute(request).await);
        }
        results
    }

    /// Read access to the response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    fn resolve_session(&self, request: &ScrapeRequest) -> Result<Option<SessionId>, ScrapeError> {
        if let Some(session) = &request.session {
            self.sessions.touch(session)?;
            return Ok(Some(session.clone()));
        }
        if let Some(category) = &request.category {
            let session = self.sessions.session_for(category)?;
            self.sessions.touch(&session)?;
            return Ok(Some(session));
        }
        Ok(None)
    }
}

impl<T: ScrapeTransport> std::fmt::Debug for RequestExecutor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor").finish_non_exhaustive()
    }
}

/// Failure-detector target for a URL: the host component.
fn target_of(url: &str) -> &str {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    without_scheme
        .split(['/', '?'])
        .next()
        .unwrap_or(without_scheme)
}
