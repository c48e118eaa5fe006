//! Shelfstream - Marketplace data collection for unreliable networks
//!
//! This library provides the resilient orchestration core used to collect
//! product, pricing, and ranking data from e-commerce sites under adverse
//! network conditions, including rolling power outages.
//!
//! # High-Level API
//!
//! The [`scheduler`] module provides the main entry point:
//!
//! ```ignore
//! use shelfstream::config::CoreSettings;
//! use shelfstream::marketplace::MarketplaceRegistry;
//! use shelfstream::scheduler::TaskScheduler;
//!
//! let settings = CoreSettings::default();
//! let mut registry = MarketplaceRegistry::new();
//! registry.register(my_marketplace);
//!
//! let scheduler = TaskScheduler::new(settings.scheduler, Arc::new(registry));
//! scheduler.schedule("takealot", TaskKind::Search, params, 5);
//! let stats = scheduler.run(None).await;
//! ```
//!
//! # Architecture
//!
//! - [`quota`]: daily/monthly request quota tracking with a circuit breaker
//! - [`session`]: sticky network-identity leases grouped by category
//! - [`outage`]: failure-pattern detection and adaptive resilience policy
//! - [`executor`]: the single choke point for outbound scraping calls
//! - [`scheduler`]: priority task queue and bounded worker pool
//! - [`marketplace`]: the per-marketplace collaborator seam
//! - [`status`]: operational introspection snapshot

pub mod config;
pub mod error;
pub mod executor;
pub mod marketplace;
pub mod outage;
pub mod quota;
pub mod scheduler;
pub mod session;
pub mod status;

/// Version of the Shelfstream library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
