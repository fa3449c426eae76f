//! Bounded LRU cache whose entries expire after a fixed TTL.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::debug;

struct CachedEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Bounded in-memory cache whose entries expire a fixed TTL after insertion.
///
/// Readers may observe an entry until its TTL elapses even if the underlying
/// data changed; call [`invalidate`](TtlCache::invalidate) or
/// [`clear`](TtlCache::clear) after known mutations.
pub struct TtlCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, CachedEntry<V>>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a clone of the cached value if it is still within its TTL.
    /// Expired entries are dropped on access.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => {}
            None => return None,
        }
        debug!("Cache entry expired");
        cache.pop(key);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let mut cache = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(
            key,
            CachedEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        let mut cache = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        cache.pop(key);
    }

    pub fn clear(&self) {
        let mut cache = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        cache.clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_fresh_entries() {
        let cache = TtlCache::new(8, Duration::from_secs(60));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = TtlCache::new(8, Duration::ZERO);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = TtlCache::new(8, Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.invalidate(&"a");
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, "one");
        cache.insert(2, "two");
        cache.get(&1);
        cache.insert(3, "three");
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some("one"));
        assert_eq!(cache.get(&3), Some("three"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache = TtlCache::new(0, Duration::from_secs(60));
        cache.insert("a", 1);
        assert_eq!(cache.len(), 1);
    }
}
