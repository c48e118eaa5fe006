//! Response cache keyed by request signature.
//!
//! Hits are served without consuming quota, so the cache is checked before
//! admission. Entries carry their storage time and are judged against a
//! caller-supplied TTL at read time, which lets the adaptive policy stretch
//! entry lifetimes during outages without rewriting the cache.

use super::transport::ScrapeRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct CacheEntry {
    stored_at: Instant,
    payload: Value,
}

/// On-disk representation of one cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    url: String,
    stored_at: DateTime<Utc>,
    payload: Value,
}

/// In-memory response cache with optional on-disk spill.
///
/// When a cache directory is configured, every stored entry is also written
/// to disk and a memory miss falls back to the disk copy. This keeps warm
/// responses available across restarts, which matters most when a restart
/// happens mid-outage.
pub struct ResponseCache {
    entries: Mutex<HashMap<u64, CacheEntry>>,
    cache_dir: Option<PathBuf>,
}

impl ResponseCache {
    /// Creates a cache, creating the spill directory if one is configured.
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = &cache_dir {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(dir = %dir.display(), error = %e, "Failed to create cache directory");
            }
        }
        Self {
            entries: Mutex::new(HashMap::new()),
            cache_dir,
        }
    }

    /// Returns the cached payload for the request if one exists and is
    /// younger than `ttl`.
    pub fn get(&self, request: &ScrapeRequest, ttl: Duration) -> Option<Value> {
        let key = signature(request);

        {
            let entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.get(&key) {
                if entry.stored_at.elapsed() < ttl {
                    debug!(url = %request.url, "Cache hit");
                    return Some(entry.payload.clone());
                }
            }
        }

        self.get_from_disk(key, request, ttl)
    }

    /// Stores the payload for the request.
    pub fn put(&self, request: &ScrapeRequest, payload: Value) {
        let key = signature(request);

        if let Some(dir) = &self.cache_dir {
            let disk = DiskEntry {
                url: request.url.clone(),
                stored_at: Utc::now(),
                payload: payload.clone(),
            };
            let path = dir.join(format!("{:016x}.json", key));
            match serde_json::to_vec(&disk) {
                Ok(bytes) => {
                    if let Err(e) = std::fs::write(&path, bytes) {
                        warn!(path = %path.display(), error = %e, "Failed to write cache entry");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to serialize cache entry"),
            }
        }

        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                payload,
            },
        );
    }

    /// Drops in-memory entries older than `max_age`, returning how many
    /// were removed. Disk entries are left for their TTL check to reject.
    pub fn clear_older_than(&self, max_age: Duration) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() < max_age);
        before - entries.len()
    }

    /// Number of in-memory entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the in-memory cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_from_disk(&self, key: u64, request: &ScrapeRequest, ttl: Duration) -> Option<Value> {
        let dir = self.cache_dir.as_ref()?;
        let path = dir.join(format!("{:016x}.json", key));
        let bytes = std::fs::read(&path).ok()?;

        let disk: DiskEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding corrupt cache entry");
                let _ = std::fs::remove_file(&path);
                return None;
            }
        };

        let age = Utc::now().signed_duration_since(disk.stored_at);
        if age < chrono::Duration::zero() || age.to_std().ok()? >= ttl {
            return None;
        }

        debug!(url = %request.url, "Disk cache hit");
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                payload: disk.payload.clone(),
            },
        );
        Some(disk.payload)
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

/// Stable signature for a request: URL plus the shaping options that change
/// the response. Session identity is deliberately excluded, so the same page
/// fetched through different leases shares one entry.
fn signature(request: &ScrapeRequest) -> u64 {
    let mut hasher = DefaultHasher::new();
    request.url.hash(&mut hasher);
    request.options.template.hash(&mut hasher);
    request.options.render_js.hash(&mut hasher);
    hasher.finish()
}
