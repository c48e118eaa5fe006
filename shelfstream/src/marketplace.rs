//! Marketplace adapters.
//!
//! A [`Marketplace`] turns a task's operation kind and parameters into one
//! or more executor calls against a specific storefront. The scheduler only
//! ever sees this trait, so new storefronts plug in without touching the
//! dispatch loop.

use crate::error::ScrapeError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

/// The operation a task asks a marketplace to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Keyword search across listings.
    Search,
    /// Full detail fetch for one product.
    Product,
    /// Category page crawl.
    Category,
    /// Promotional/deals page crawl.
    Deals,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Search => "search",
            TaskKind::Product => "product",
            TaskKind::Category => "category",
            TaskKind::Deals => "deals",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boxed future returned by marketplace operations.
pub type MarketplaceFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, ScrapeError>> + Send + 'a>>;

/// A storefront adapter the scheduler can dispatch tasks to.
///
/// Implementations translate `(kind, params)` into requests through the
/// shared executor and return the extracted payload. Errors must use the
/// shared error taxonomy so the scheduler's failure handling applies: a
/// malformed listing is [`ScrapeError::Validation`], a dead connection is
/// [`ScrapeError::Network`].
pub trait Marketplace: Send + Sync {
    /// Stable adapter name used in task routing and logs.
    fn name(&self) -> &str;

    /// Performs one operation against the storefront.
    fn execute(&self, kind: TaskKind, params: &Value) -> MarketplaceFuture<'_>;
}

/// Name-keyed registry of marketplace adapters.
#[derive(Default)]
pub struct MarketplaceRegistry {
    adapters: HashMap<String, Arc<dyn Marketplace>>,
}

impl MarketplaceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own name, replacing any previous
    /// adapter with that name.
    pub fn register(&mut self, adapter: Arc<dyn Marketplace>) {
        info!(marketplace = adapter.name(), "Registered marketplace adapter");
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    /// Looks up an adapter by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Marketplace>> {
        self.adapters.get(name).cloned()
    }

    /// Registered adapter names.
    pub fn names(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapters are registered.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for MarketplaceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketplaceRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticMarketplace {
        name: String,
    }

    impl Marketplace for StaticMarketplace {
        fn name(&self) -> &str {
            &self.name
        }

        fn execute(&self, kind: TaskKind, _params: &Value) -> MarketplaceFuture<'_> {
            Box::pin(async move { Ok(json!({ "kind": kind.as_str() })) })
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = MarketplaceRegistry::new();
        registry.register(Arc::new(StaticMarketplace {
            name: "takealot".to_string(),
        }));

        assert_eq!(registry.len(), 1);
        assert!(registry.get("takealot").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[tokio::test]
    async fn test_adapter_dispatch() {
        let mut registry = MarketplaceRegistry::new();
        registry.register(Arc::new(StaticMarketplace {
            name: "takealot".to_string(),
        }));

        let adapter = registry.get("takealot").unwrap();
        let result = adapter.execute(TaskKind::Search, &json!({})).await.unwrap();
        assert_eq!(result, json!({ "kind": "search" }));
    }
}
