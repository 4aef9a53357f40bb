//! In-memory key/value cache with per-entry time-to-live.
//!
//! Expiry is lazy: an entry is checked on every lookup and evicted by the
//! lookup that finds it expired. There is no background sweeper and no size
//! bound; keys come from a small finite domain (symbols, categories, fixed
//! endpoints).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::stats::CacheStats;
use crate::time::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    /// An entry whose age has reached its ttl is expired.
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

/// Concurrent TTL cache keyed by opaque strings.
///
/// Callers own key construction; see [`super::keys`] for the namespaces used
/// by the runtime.
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Store `value` under `key`, replacing any previous entry and restarting
    /// its lifetime.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            created_at: self.clock.now(),
            ttl,
        };
        self.entries.insert(key.into(), entry);
    }

    /// Return the value if it has not expired. An expired entry is evicted.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        {
            // The shard guard must be released before eviction below.
            let entry = match self.entries.get(key) {
                Some(entry) => entry,
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            };
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }

        // A concurrent put may have refreshed the entry; only evict if still expired.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Whether a live entry exists. Does not evict or touch hit counters.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// Remove a single entry.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry whose key starts with `prefix`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let matches = key.starts_with(prefix);
            removed += usize::from(matches);
            !matches
        });
        removed
    }

    /// Evict every expired entry now. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of entry counts and hit/miss counters. Does not evict.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let mut entries = 0u64;
        let mut expired = 0u64;
        for entry in self.entries.iter() {
            entries += 1;
            if entry.is_expired(now) {
                expired += 1;
            }
        }
        CacheStats {
            entries,
            active: entries - expired,
            expired,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.len())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}
