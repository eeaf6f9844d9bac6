//! Bounded, TTL-aware LRU cache used for the per-domain email-result cache
//! (spec.md §3, §9: "impose an LRU bound... to prevent memory growth").
//!
//! Grounded on the `lruttl` pattern used by larger MTA codebases in this
//! space: a `parking_lot`-guarded `lru::LruCache` storing `(value,
//! expires_at)` pairs, with lazy eviction on read.

use lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Instant;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct LruCacheWithTtl<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, Entry<V>>>,
}

impl<K: Hash + Eq + Clone, V: Clone> LruCacheWithTtl<K, V> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns a cached value if present and not expired. Lazily evicts it
    /// if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock();
        let entry = cache.get(key)?;
        if Instant::now() < entry.expires_at {
            Some(entry.value.clone())
        } else {
            cache.pop(key);
            None
        }
    }

    pub fn insert(&self, key: K, value: V, ttl: std::time::Duration) {
        self.inner.lock().put(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drops any expired entries. Cheap, best-effort — called opportunistically
    /// rather than on a background timer, per spec.md's "purged lazily" rule.
    pub fn evict_expired(&self) {
        let mut cache = self.inner.lock();
        let now = Instant::now();
        let expired: Vec<K> = cache
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            cache.pop(&key);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> Default for LruCacheWithTtl<K, V> {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn returns_inserted_value_before_expiry() {
        let cache: LruCacheWithTtl<String, u32> = LruCacheWithTtl::new(4);
        cache.insert("a".to_string(), 1, Duration::from_secs(60));
        assert_eq!(cache.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache: LruCacheWithTtl<String, u32> = LruCacheWithTtl::new(4);
        cache.insert("a".to_string(), 1, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn capacity_is_bounded() {
        let cache: LruCacheWithTtl<i32, i32> = LruCacheWithTtl::new(2);
        cache.insert(1, 1, Duration::from_secs(60));
        cache.insert(2, 2, Duration::from_secs(60));
        cache.insert(3, 3, Duration::from_secs(60));
        assert_eq!(cache.len(), 2);
        // Least-recently-used (key 1) was evicted.
        assert_eq!(cache.get(&1), None);
    }
}
