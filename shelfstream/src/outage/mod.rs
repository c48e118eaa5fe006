//! Outage detection and adaptive resilience.
//!
//! Rolling power outages produce correlated network failures across
//! otherwise-unrelated requests. This module watches the failure stream for
//! that pattern, optionally corroborates it against an authoritative grid
//! status feed, and derives the retry/backoff/timeout/cache parameters the
//! request executor should use right now.

mod detector;
mod feed;
mod policy;

pub use detector::{FailureDetector, FailurePattern, NetworkStatus};
pub use feed::{spawn_feed_poller, GridStatusFeed, OutageFeed, OutageWindow};
pub use policy::{AdaptivePolicy, ResilienceParams};
