//! Quota tracking for the upstream scraping API.
//!
//! The tracker enforces a hard monthly/daily cap on billable outbound calls
//! and trips a circuit breaker when usage approaches exhaustion. State can be
//! persisted as a flat JSON snapshot so a process restart does not reset
//! quota accounting mid-period.

mod persist;
mod tracker;

pub use persist::QuotaSnapshot;
pub use tracker::{QuotaStatus, QuotaTracker};
