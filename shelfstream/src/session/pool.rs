//! Category-keyed session pool with lifetime and usage caps.

use crate::config::SessionSettings;
use crate::error::ScrapeError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, error, info};

/// Global counter for generating unique session IDs.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a session lease.
#[derive(Clone, Hash, Eq, PartialEq, Serialize)]
pub struct SessionId(String);

impl SessionId {
    fn generate(prefix: &str) -> Self {
        let counter = SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}{:08x}", prefix, counter))
    }

    /// Returns the string value of this session ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tracked session lease.
#[derive(Debug)]
struct SessionEntry {
    category: String,
    created_at: Instant,
    created_at_utc: DateTime<Utc>,
    last_used: Instant,
    request_count: u32,
}

/// Detailed information about one session, for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub request_count: u32,
    pub age_secs: f64,
    pub idle_secs: f64,
    pub remaining_lifetime_secs: f64,
    pub remaining_requests: u32,
    pub is_valid: bool,
}

/// Pool-level statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionPoolStats {
    pub active_sessions: usize,
    pub total_created: u64,
    pub total_expired: u64,
    pub total_requests: u64,
    /// Count of currently valid sessions per category.
    pub valid_by_category: HashMap<String, usize>,
}

/// Internal mutable state for the pool.
#[derive(Debug)]
struct PoolState {
    sessions: HashMap<SessionId, SessionEntry>,
    by_category: HashMap<String, Vec<SessionId>>,
    last_cleanup: Instant,
    total_created: u64,
    total_expired: u64,
    total_requests: u64,
}

/// Issues and reuses short-lived network identity leases.
///
/// A session is valid only while its age is below the configured lifetime
/// AND its request count is below the per-session cap. An invalid session is
/// never handed to a new caller and is evicted on the next cleanup pass.
///
/// Eviction runs opportunistically at most once per cleanup interval, and is
/// forced before the pool-size limit is enforced: creating a session at
/// capacity first runs an eviction pass, and only fails if the pool is still
/// full afterwards.
pub struct SessionPool {
    settings: SessionSettings,
    inner: Mutex<PoolState>,
}

impl SessionPool {
    /// Creates an empty pool.
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            inner: Mutex::new(PoolState {
                sessions: HashMap::new(),
                by_category: HashMap::new(),
                last_cleanup: Instant::now(),
                total_created: 0,
                total_expired: 0,
                total_requests: 0,
            }),
        }
    }

    /// Returns a valid session for the category, creating one if necessary.
    ///
    /// Existing sessions tagged with the category are scanned first; the
    /// first currently-valid one wins, so related requests keep sharing an
    /// exit identity until the lease ages out.
    pub fn session_for(&self, category: &str) -> Result<SessionId, ScrapeError> {
        let mut state = self.inner.lock().unwrap();
        self.cleanup_if_due(&mut state);

        if let Some(ids) = state.by_category.get(category) {
            for id in ids {
                if let Some(entry) = state.sessions.get(id) {
                    if self.entry_is_valid(entry) {
                        debug!(session = %id, category, "Reusing session");
                        return Ok(id.clone());
                    }
                }
            }
        }

        self.create_session(&mut state, category)
    }

    /// Records one request against the session and refreshes its last-used
    /// time. Fails when the lease is no longer valid.
    pub fn touch(&self, session_id: &SessionId) -> Result<(), ScrapeError> {
        let mut state = self.inner.lock().unwrap();

        let valid = state
            .sessions
            .get(session_id)
            .map(|entry| self.entry_is_valid(entry))
            .unwrap_or(false);
        if !valid {
            return Err(ScrapeError::SessionExpired(session_id.to_string()));
        }

        let entry = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ScrapeError::SessionExpired(session_id.to_string()))?;
        entry.last_used = Instant::now();
        entry.request_count += 1;
        state.total_requests += 1;
        Ok(())
    }

    /// Whether the session exists and is within its lifetime and usage caps.
    pub fn is_valid(&self, session_id: &SessionId) -> bool {
        let state = self.inner.lock().unwrap();
        state
            .sessions
            .get(session_id)
            .map(|entry| self.entry_is_valid(entry))
            .unwrap_or(false)
    }

    /// Evicts all invalid sessions, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let mut state = self.inner.lock().unwrap();
        self.evict_locked(&mut state)
    }

    /// Returns pool statistics. Runs an eviction pass first so counts
    /// reflect only live leases.
    pub fn stats(&self) -> SessionPoolStats {
        let mut state = self.inner.lock().unwrap();
        self.evict_locked(&mut state);

        let mut valid_by_category = HashMap::new();
        for (category, ids) in &state.by_category {
            let valid = ids
                .iter()
                .filter(|id| {
                    state
                        .sessions
                        .get(*id)
                        .map(|e| self.entry_is_valid(e))
                        .unwrap_or(false)
                })
                .count();
            valid_by_category.insert(category.clone(), valid);
        }

        SessionPoolStats {
            active_sessions: state.sessions.len(),
            total_created: state.total_created,
            total_expired: state.total_expired,
            total_requests: state.total_requests,
            valid_by_category,
        }
    }

    /// Returns detailed information about one session, if tracked.
    pub fn session_info(&self, session_id: &SessionId) -> Option<SessionInfo> {
        let state = self.inner.lock().unwrap();
        let entry = state.sessions.get(session_id)?;

        let age = entry.created_at.elapsed();
        let remaining_lifetime = self.settings.max_lifetime.saturating_sub(age);

        Some(SessionInfo {
            session_id: session_id.to_string(),
            category: entry.category.clone(),
            created_at: entry.created_at_utc,
            request_count: entry.request_count,
            age_secs: age.as_secs_f64(),
            idle_secs: entry.last_used.elapsed().as_secs_f64(),
            remaining_lifetime_secs: remaining_lifetime.as_secs_f64(),
            remaining_requests: self
                .settings
                .max_requests_per_session
                .saturating_sub(entry.request_count),
            is_valid: self.entry_is_valid(entry),
        })
    }

    fn entry_is_valid(&self, entry: &SessionEntry) -> bool {
        entry.created_at.elapsed() < self.settings.max_lifetime
            && entry.request_count < self.settings.max_requests_per_session
    }

    fn cleanup_if_due(&self, state: &mut PoolState) {
        if state.last_cleanup.elapsed() >= self.settings.cleanup_interval {
            self.evict_locked(state);
            state.last_cleanup = Instant::now();
        }
    }

    fn evict_locked(&self, state: &mut PoolState) -> usize {
        let expired: Vec<SessionId> = state
            .sessions
            .iter()
            .filter(|(_, entry)| !self.entry_is_valid(entry))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(entry) = state.sessions.remove(id) {
                if let Some(ids) = state.by_category.get_mut(&entry.category) {
                    ids.retain(|other| other != id);
                    if ids.is_empty() {
                        state.by_category.remove(&entry.category);
                    }
                }
            }
        }

        if !expired.is_empty() {
            state.total_expired += expired.len() as u64;
            info!(count = expired.len(), "Evicted expired sessions");
        }
        expired.len()
    }

    fn create_session(
        &self,
        state: &mut PoolState,
        category: &str,
    ) -> Result<SessionId, ScrapeError> {
        if state.sessions.len() >= self.settings.max_sessions {
            // Forced eviction pass before the limit is enforced.
            self.evict_locked(state);
            if state.sessions.len() >= self.settings.max_sessions {
                error!(
                    limit = self.settings.max_sessions,
                    "Maximum session limit reached"
                );
                return Err(ScrapeError::SessionLimitExceeded(self.settings.max_sessions));
            }
        }

        let id = SessionId::generate(&self.settings.session_prefix);
        let now = Instant::now();
        state.sessions.insert(
            id.clone(),
            SessionEntry {
                category: category.to_string(),
                created_at: now,
                created_at_utc: Utc::now(),
                last_used: now,
                request_count: 0,
            },
        );
        state
            .by_category
            .entry(category.to_string())
            .or_default()
            .push(id.clone());
        state.total_created += 1;

        info!(session = %id, category, "Created new session");
        Ok(id)
    }
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pool_with(max_sessions: usize, max_requests: u32, lifetime: Duration) -> SessionPool {
        SessionPool::new(SessionSettings {
            max_lifetime: lifetime,
            max_sessions,
            max_requests_per_session: max_requests,
            cleanup_interval: Duration::from_millis(10),
            session_prefix: "test_".to_string(),
        })
    }

    #[test]
    fn test_new_session_is_valid() {
        let pool = pool_with(10, 100, Duration::from_secs(600));
        let id = pool.session_for("search").unwrap();
        assert!(pool.is_valid(&id));
    }

    #[test]
    fn test_category_reuse_returns_same_session() {
        let pool = pool_with(10, 100, Duration::from_secs(600));
        let first = pool.session_for("product_electronics").unwrap();
        let second = pool.session_for("product_electronics").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_categories_get_different_sessions() {
        let pool = pool_with(10, 100, Duration::from_secs(600));
        let search = pool.session_for("search").unwrap();
        let product = pool.session_for("product").unwrap();
        assert_ne!(search, product);
    }

    #[test]
    fn test_request_cap_invalidates_session() {
        let pool = pool_with(10, 3, Duration::from_secs(600));
        let id = pool.session_for("search").unwrap();

        for _ in 0..3 {
            pool.touch(&id).unwrap();
        }
        assert!(!pool.is_valid(&id));
        assert!(matches!(
            pool.touch(&id),
            Err(ScrapeError::SessionExpired(_))
        ));
    }

    #[test]
    fn test_lifetime_expiry_invalidates_session() {
        let pool = pool_with(10, 100, Duration::from_millis(20));
        let id = pool.session_for("search").unwrap();
        assert!(pool.is_valid(&id));

        std::thread::sleep(Duration::from_millis(30));
        assert!(!pool.is_valid(&id));
    }

    #[test]
    fn test_expired_session_replaced_on_next_request() {
        let pool = pool_with(10, 2, Duration::from_secs(600));
        let first = pool.session_for("search").unwrap();
        pool.touch(&first).unwrap();
        pool.touch(&first).unwrap();

        // Lease used up; the next request for the category gets a new one.
        let second = pool.session_for("search").unwrap();
        assert_ne!(first, second);
        assert!(pool.is_valid(&second));
    }

    #[test]
    fn test_evict_expired_removes_invalid_sessions() {
        let pool = pool_with(10, 1, Duration::from_secs(600));
        let id = pool.session_for("search").unwrap();
        pool.touch(&id).unwrap();

        let evicted = pool.evict_expired();
        assert_eq!(evicted, 1);
        assert!(!pool.is_valid(&id));
        assert_eq!(pool.stats().active_sessions, 0);
    }

    #[test]
    fn test_capacity_limit_with_forced_eviction() {
        let pool = pool_with(2, 1, Duration::from_secs(600));
        let a = pool.session_for("a").unwrap();
        let _b = pool.session_for("b").unwrap();

        // Pool is full but "a" is used up, so creating for "c" evicts it.
        pool.touch(&a).unwrap();
        let c = pool.session_for("c").unwrap();
        assert!(pool.is_valid(&c));
    }

    #[test]
    fn test_capacity_limit_exceeded_when_all_valid() {
        let pool = pool_with(2, 100, Duration::from_secs(600));
        pool.session_for("a").unwrap();
        pool.session_for("b").unwrap();

        assert!(matches!(
            pool.session_for("c"),
            Err(ScrapeError::SessionLimitExceeded(2))
        ));
    }

    #[test]
    fn test_stats_counts_by_category() {
        let pool = pool_with(10, 100, Duration::from_secs(600));
        let search = pool.session_for("search").unwrap();
        pool.session_for("product").unwrap();
        pool.touch(&search).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.total_created, 2);
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.valid_by_category.get("search"), Some(&1));
        assert_eq!(stats.valid_by_category.get("product"), Some(&1));
    }

    #[test]
    fn test_session_info_detail() {
        let pool = pool_with(10, 100, Duration::from_secs(600));
        let id = pool.session_for("search").unwrap();
        pool.touch(&id).unwrap();

        let info = pool.session_info(&id).unwrap();
        assert_eq!(info.category, "search");
        assert_eq!(info.request_count, 1);
        assert_eq!(info.remaining_requests, 99);
        assert!(info.is_valid);
        assert!(info.remaining_lifetime_secs > 0.0);
    }

    #[test]
    fn test_session_info_unknown_id() {
        let pool = pool_with(10, 100, Duration::from_secs(600));
        let unknown = SessionId("test_deadbeef".to_string());
        assert!(pool.session_info(&unknown).is_none());
    }
}
