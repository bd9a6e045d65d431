//! TTL-based caching for extraction results.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Cache key under which the single scraped dataset is stored.
pub const EVENTS_CACHE_KEY: &str = "events";

/// A cached value with its absolute expiry.
#[derive(Clone)]
struct CachedEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CachedEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe store whose entries expire a fixed TTL after insertion.
///
/// Uses DashMap for concurrent access without external locking. Eviction is
/// lazy: an expired entry is removed by the read that finds it stale.
pub struct ResultCache<K, V> {
    entries: DashMap<K, CachedEntry<V>>,
    ttl: Duration,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates a new cache with the given freshness window.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Gets a cached value if it exists and hasn't expired.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.is_fresh(now) {
            return Some(entry.value.clone());
        }

        // Entry expired, remove it
        drop(entry);
        self.entries
            .remove_if(key, |_, entry| !entry.is_fresh(Instant::now()));
        None
    }

    /// Stores a value, replacing any previous one, expiring `ttl` from now.
    pub fn set(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CachedEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Returns true if a fresh value is cached. Evicts a stale one.
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Invalidates (removes) a cached entry.
    pub fn invalidate<Q>(&self, key: &Q)
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.remove(key);
    }

    /// Clears all entries from the cache.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Returns the number of entries in the cache (including expired ones).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gets cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut total = 0;
        let mut expired = 0;

        for entry in self.entries.iter() {
            total += 1;
            if !entry.is_fresh(now) {
                expired += 1;
            }
        }

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub ttl_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_get_within_ttl_returns_value() {
        let cache: ResultCache<String, Vec<u32>> = ResultCache::new(Duration::from_secs(60));
        cache.set(EVENTS_CACHE_KEY.to_string(), vec![1, 2, 3]);

        assert_eq!(cache.get(EVENTS_CACHE_KEY), Some(vec![1, 2, 3]));
        assert!(cache.has(EVENTS_CACHE_KEY));
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let cache: ResultCache<&str, u32> = ResultCache::new(Duration::from_millis(20));
        cache.set("events", 7);
        sleep(Duration::from_millis(40));

        assert_eq!(cache.stats().expired_entries, 1);
        assert_eq!(cache.get("events"), None);
        assert_eq!(cache.len(), 0);
        assert!(!cache.has("events"));
    }

    #[test]
    fn test_set_replaces_previous_value() {
        let cache: ResultCache<&str, &str> = ResultCache::new(Duration::from_secs(300));
        cache.set("events", "old");
        cache.set("events", "new");

        assert_eq!(cache.get("events"), Some("new"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache: ResultCache<&str, u8> = ResultCache::new(Duration::from_secs(300));
        cache.set("a", 1);
        cache.set("b", 2);

        cache.invalidate("a");
        assert!(!cache.has("a"));
        assert!(cache.has("b"));

        cache.clear();
        assert!(cache.is_empty());
    }
}
