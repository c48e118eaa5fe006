//! Session leases for consistent outbound network identity.
//!
//! The upstream proxy provider pins all requests that carry the same session
//! id to one exit IP for a bounded lifetime. The pool hands out and reuses
//! these leases grouped by a caller-chosen category so that related requests
//! (a search and its detail pages, say) share an identity.

mod pool;

pub use pool::{SessionId, SessionInfo, SessionPool, SessionPoolStats};
