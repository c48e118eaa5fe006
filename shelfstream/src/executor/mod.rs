//! Request execution.
//!
//! [`RequestExecutor`] is the single choke point for outbound scraping
//! calls: it consults the quota tracker for admission, the session pool for
//! a lease, and the adaptive policy for resilience parameters, performs the
//! call with retry and backoff, and reports the outcome back to the failure
//! detector and quota tracker.

mod backoff;
mod cache;
mod request;
mod transport;

pub use backoff::{base_delay, retry_delay};
pub use cache::ResponseCache;
pub use request::RequestExecutor;
pub use transport::{ProxyTransport, RequestOptions, ScrapeRequest, ScrapeTransport};
