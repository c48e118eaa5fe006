//! Authoritative outage-status feed.
//!
//! The feed reports the current outage stage (0 = none, >0 = active) and a
//! schedule of upcoming outage windows per monitored area. It is polled at
//! most once per configured interval; the previous response is cached and
//! reused between polls, so hot-path callers never block on the network.

use super::detector::FailureDetector;
use crate::config::OutageSettings;
use crate::error::ScrapeError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A scheduled outage window for a monitored area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutageWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Trait for outage-status feed backends.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock feeds in tests.
pub trait OutageFeed: Send + Sync {
    /// Returns the current outage stage (0 = none, >0 = active).
    fn current_stage(&self) -> impl Future<Output = Result<u8, ScrapeError>> + Send;

    /// Returns the upcoming outage windows for an area.
    fn area_windows(
        &self,
        area: &str,
    ) -> impl Future<Output = Result<Vec<OutageWindow>, ScrapeError>> + Send;
}

#[derive(Debug, Deserialize)]
struct StageResponse {
    stage: u8,
}

#[derive(Debug, Deserialize)]
struct AreaResponse {
    #[serde(default)]
    events: Vec<AreaEvent>,
}

#[derive(Debug, Deserialize)]
struct AreaEvent {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug)]
struct FeedCache {
    last_poll: Option<Instant>,
    stage: u8,
}

/// HTTP-backed grid status feed.
///
/// Responses are cached for the configured poll interval, so calling
/// [`OutageFeed::current_stage`] more often than that returns the cached
/// stage without touching the network.
pub struct GridStatusFeed {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    poll_interval: std::time::Duration,
    cache: Mutex<FeedCache>,
}

impl GridStatusFeed {
    /// Creates a feed client for the given endpoint and token.
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        poll_interval: std::time::Duration,
    ) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ScrapeError::Network(format!("Failed to create feed client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_token: api_token.into(),
            poll_interval,
            cache: Mutex::new(FeedCache {
                last_poll: None,
                stage: 0,
            }),
        })
    }

    fn cached_stage(&self) -> Option<u8> {
        let cache = self.cache.lock().unwrap();
        match cache.last_poll {
            Some(at) if at.elapsed() < self.poll_interval => Some(cache.stage),
            _ => None,
        }
    }

    fn store_stage(&self, stage: u8) {
        let mut cache = self.cache.lock().unwrap();
        cache.last_poll = Some(Instant::now());
        cache.stage = stage;
    }
}

impl OutageFeed for GridStatusFeed {
    async fn current_stage(&self) -> Result<u8, ScrapeError> {
        if let Some(stage) = self.cached_stage() {
            debug!(stage, "Returning cached feed stage");
            return Ok(stage);
        }

        let url = format!("{}/status", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Token", &self.api_token)
            .send()
            .await
            .map_err(|e| ScrapeError::Network(format!("Feed request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ScrapeError::Network(format!(
                "Feed returned HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let parsed: StageResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::Network(format!("Invalid feed response: {}", e)))?;

        self.store_stage(parsed.stage);
        Ok(parsed.stage)
    }

    async fn area_windows(&self, area: &str) -> Result<Vec<OutageWindow>, ScrapeError> {
        let url = format!("{}/area?id={}", self.base_url, area);
        let response = self
            .client
            .get(&url)
            .header("Token", &self.api_token)
            .send()
            .await
            .map_err(|e| ScrapeError::Network(format!("Feed request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ScrapeError::Network(format!(
                "Feed returned HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let parsed: AreaResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::Network(format!("Invalid area response: {}", e)))?;

        Ok(parsed
            .events
            .into_iter()
            .map(|event| OutageWindow {
                start: event.start,
                end: event.end,
            })
            .collect())
    }
}

/// Spawns the periodic feed-polling task.
///
/// The poller writes fresh observations into the shared failure detector:
/// the current stage on every tick, and the earliest upcoming outage window
/// across the monitored areas. Feed errors are logged and skipped; the
/// detector falls back to its local pattern once the last observation goes
/// stale.
pub fn spawn_feed_poller<F>(
    detector: Arc<FailureDetector>,
    feed: F,
    settings: OutageSettings,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    F: OutageFeed + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(settings.feed_poll_interval);
        info!(
            interval_secs = settings.feed_poll_interval.as_secs(),
            areas = settings.monitored_areas.len(),
            "Outage feed poller started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Outage feed poller stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match feed.current_stage().await {
                Ok(stage) => detector.apply_feed_stage(stage),
                Err(e) => {
                    error!(error = %e, "Failed to poll outage feed");
                    continue;
                }
            }

            let mut earliest: Option<DateTime<Utc>> = None;
            for area in &settings.monitored_areas {
                match feed.area_windows(area).await {
                    Ok(windows) => {
                        let now = Utc::now();
                        for window in windows {
                            if window.start > now
                                && earliest.map(|e| window.start < e).unwrap_or(true)
                            {
                                earliest = Some(window.start);
                            }
                        }
                    }
                    Err(e) => {
                        error!(area, error = %e, "Failed to fetch area schedule");
                    }
                }
            }
            if earliest.is_some() {
                detector.set_next_outage(earliest);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Mock feed for testing.
    struct MockFeed {
        stage: u8,
        windows: Vec<OutageWindow>,
        polls: AtomicU32,
    }

    impl OutageFeed for MockFeed {
        async fn current_stage(&self) -> Result<u8, ScrapeError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(self.stage)
        }

        async fn area_windows(&self, _area: &str) -> Result<Vec<OutageWindow>, ScrapeError> {
            Ok(self.windows.clone())
        }
    }

    fn settings(poll: Duration, areas: Vec<String>) -> OutageSettings {
        OutageSettings {
            feed_poll_interval: poll,
            monitored_areas: areas,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_poller_applies_feed_stage() {
        let detector = Arc::new(FailureDetector::new(OutageSettings::default()));
        let feed = MockFeed {
            stage: 2,
            windows: vec![],
            polls: AtomicU32::new(0),
        };

        let token = CancellationToken::new();
        let handle = spawn_feed_poller(
            Arc::clone(&detector),
            feed,
            settings(Duration::from_millis(10), vec![]),
            token.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(
            detector.status(),
            crate::outage::NetworkStatus::OutageConfirmed
        );
    }

    #[tokio::test]
    async fn test_poller_records_next_outage_window() {
        let detector = Arc::new(FailureDetector::new(OutageSettings::default()));
        let start = Utc::now() + chrono::Duration::minutes(20);
        let feed = MockFeed {
            stage: 0,
            windows: vec![OutageWindow {
                start,
                end: start + chrono::Duration::hours(2),
            }],
            polls: AtomicU32::new(0),
        };

        let token = CancellationToken::new();
        let handle = spawn_feed_poller(
            Arc::clone(&detector),
            feed,
            settings(Duration::from_millis(10), vec!["capetown-8".to_string()]),
            token.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        handle.await.unwrap();

        assert!(detector.is_outage_expected_soon(chrono::Duration::minutes(30)));
    }

    #[tokio::test]
    async fn test_poller_stops_on_cancellation() {
        let detector = Arc::new(FailureDetector::new(OutageSettings::default()));
        let feed = MockFeed {
            stage: 0,
            windows: vec![],
            polls: AtomicU32::new(0),
        };

        let token = CancellationToken::new();
        let handle = spawn_feed_poller(
            detector,
            feed,
            settings(Duration::from_secs(60), vec![]),
            token.clone(),
        );

        token.cancel();
        handle.await.unwrap();
    }
}
