//! Transport abstraction over the wrapped HTTP-scraping provider.

use crate::error::ScrapeError;
use crate::session::SessionId;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Request-shaping options forwarded to the provider.
///
/// The provider's own request/response schema is out of scope here; these
/// are the knobs the orchestration layer cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Provider-side extraction template, when one applies.
    pub template: Option<String>,
    /// Whether the provider should render JavaScript before returning.
    pub render_js: bool,
}

/// One logical outbound scraping call.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    /// Target URL.
    pub url: String,
    /// Explicit session lease to pin the request to, if the caller already
    /// holds one.
    pub session: Option<SessionId>,
    /// Session category to lease from the pool when no explicit session is
    /// supplied. `None` means the request needs no sticky identity.
    pub category: Option<String>,
    /// Request-shaping options.
    pub options: RequestOptions,
}

impl ScrapeRequest {
    /// Creates a request with no session requirements.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session: None,
            category: None,
            options: RequestOptions::default(),
        }
    }

    /// Pins the request to an explicit session lease.
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = Some(session);
        self
    }

    /// Requests a pooled session for the given category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the request-shaping options.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// Trait for scraping-provider transports.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock transports in tests.
pub trait ScrapeTransport: Send + Sync {
    /// Performs one attempt against the provider.
    ///
    /// Returns the structured payload, or a [`ScrapeError::Network`] for
    /// transport-level failures. The executor owns retries; implementations
    /// must not retry internally.
    fn fetch(
        &self,
        url: &str,
        session_id: Option<&SessionId>,
        options: &RequestOptions,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, ScrapeError>> + Send;
}

impl<T: ScrapeTransport> ScrapeTransport for std::sync::Arc<T> {
    fn fetch(
        &self,
        url: &str,
        session_id: Option<&SessionId>,
        options: &RequestOptions,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, ScrapeError>> + Send {
        self.as_ref().fetch(url, session_id, options, timeout)
    }
}

/// Real transport implementation over the scraping provider's HTTP API.
///
/// Each logical call is a POST of the target URL plus shaping options; the
/// provider fetches the target through its own egress pool, pinning repeat
/// calls with the same session id to one exit IP.
#[derive(Clone)]
pub struct ProxyTransport {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
}

impl ProxyTransport {
    /// Creates a transport for the given provider endpoint and token.
    pub fn new(
        endpoint: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                ScrapeError::Network(format!("Failed to create transport client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_token: api_token.into(),
        })
    }
}

impl ScrapeTransport for ProxyTransport {
    async fn fetch(
        &self,
        url: &str,
        session_id: Option<&SessionId>,
        options: &RequestOptions,
        timeout: Duration,
    ) -> Result<Value, ScrapeError> {
        let mut payload = json!({ "url": url });
        if let Some(session) = session_id {
            payload["session_id"] = json!(session.as_str());
        }
        if let Some(template) = &options.template {
            payload["template"] = json!(template);
        }
        if options.render_js {
            payload["render_js"] = json!(true);
        }

        debug!(url, session = ?session_id, "Dispatching provider request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                warn!(url, error = %e, is_timeout = e.is_timeout(), "Provider request failed");
                ScrapeError::Network(format!("Request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(ScrapeError::Network(format!(
                "HTTP {} from provider for {}",
                response.status(),
                url
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ScrapeError::Network(format!("Invalid provider response: {}", e)))
    }
}
