//! Weight-bounded LRU cache for decoded images.
//!
//! The resident set sits behind a narrow mutex that is only held for lookup,
//! insert and eviction. Fetching and decoding happen outside of it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::{debug, info};

use super::loader::DecodedImage;

/// Default memory budget the cache capacity is derived from (256 MiB).
pub const DEFAULT_MEMORY_BUDGET: u64 = 256 * 1024 * 1024;

/// Default share of the memory budget given to the cache (1/8).
pub const DEFAULT_BUDGET_FRACTION: u64 = 8;

struct CacheEntry<V> {
    value: V,
    weight: u64,
}

struct Resident<V> {
    entries: LruCache<String, CacheEntry<V>>,
    weight: u64,
}

/// LRU cache bounded by total entry weight.
///
/// Keys are canonical remote paths. Cloning values should be cheap, so the
/// gallery stores `Arc<DecodedImage>`.
pub struct ImageCache<V = Arc<DecodedImage>> {
    resident: Mutex<Resident<V>>,
    capacity: u64,
}

impl<V: Clone> ImageCache<V> {
    /// Create a cache holding at most `capacity` weight units.
    pub fn new(capacity: u64) -> Self {
        Self {
            resident: Mutex::new(Resident {
                entries: LruCache::unbounded(),
                weight: 0,
            }),
            capacity,
        }
    }

    /// Create a cache sized to `memory_budget / fraction`.
    pub fn from_budget(memory_budget: u64, fraction: u64) -> Self {
        let capacity = memory_budget / fraction.max(1);
        debug!(memory_budget, fraction, capacity, "Sizing image cache");
        Self::new(capacity)
    }

    fn lock(&self) -> MutexGuard<'_, Resident<V>> {
        self.resident.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up an entry, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().entries.get(key).map(|e| e.value.clone())
    }

    /// Whether `key` is resident. Does not change recency.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains(key)
    }

    /// Insert an entry, then evict least recently used entries until the
    /// resident weight fits the capacity.
    ///
    /// Returns `false` when the entry alone exceeds the capacity; it is not
    /// admitted and any previous entry under `key` is dropped.
    pub fn put(&self, key: impl Into<String>, value: V, weight: u64) -> bool {
        let key = key.into();
        let mut resident = self.lock();

        if let Some(old) = resident.entries.pop(&key) {
            resident.weight -= old.weight;
        }
        if weight > self.capacity {
            debug!(key = %key, weight, capacity = self.capacity, "Entry exceeds cache capacity");
            return false;
        }

        resident.entries.put(key, CacheEntry { value, weight });
        resident.weight += weight;

        while resident.weight > self.capacity {
            match resident.entries.pop_lru() {
                Some((evicted, entry)) => {
                    resident.weight -= entry.weight;
                    debug!(key = %evicted, weight = entry.weight, "Evicted cache entry");
                }
                None => break,
            }
        }
        true
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut resident = self.lock();
        let dropped = resident.entries.len();
        resident.entries.clear();
        resident.weight = 0;
        info!(entries = dropped, "Image cache cleared");
    }

    /// Total weight of resident entries.
    pub fn resident_weight(&self) -> u64 {
        self.lock().weight
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum resident weight.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_least_recently_used() {
        let cache: ImageCache<&str> = ImageCache::new(100);
        assert!(cache.put("A", "a", 40));
        assert!(cache.put("B", "b", 40));
        assert!(cache.put("C", "c", 40));

        assert!(!cache.contains("A"));
        assert!(cache.contains("B"));
        assert!(cache.contains("C"));
        assert_eq!(cache.resident_weight(), 80);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache: ImageCache<&str> = ImageCache::new(100);
        cache.put("A", "a", 40);
        cache.put("B", "b", 40);
        assert_eq!(cache.get("A"), Some("a"));
        cache.put("C", "c", 40);

        assert!(cache.contains("A"));
        assert!(!cache.contains("B"));
    }

    #[test]
    fn test_contains_does_not_refresh() {
        let cache: ImageCache<&str> = ImageCache::new(100);
        cache.put("A", "a", 40);
        cache.put("B", "b", 40);
        assert!(cache.contains("A"));
        cache.put("C", "c", 40);
        assert!(!cache.contains("A"));
    }

    #[test]
    fn test_oversized_entry_not_admitted() {
        let cache: ImageCache<&str> = ImageCache::new(100);
        cache.put("A", "a", 40);
        assert!(!cache.put("huge", "h", 101));
        assert!(!cache.contains("huge"));
        assert!(cache.contains("A"));
        assert_eq!(cache.resident_weight(), 40);
    }

    #[test]
    fn test_replace_updates_weight() {
        let cache: ImageCache<&str> = ImageCache::new(100);
        cache.put("A", "a", 40);
        cache.put("A", "a2", 10);
        assert_eq!(cache.resident_weight(), 10);
        assert_eq!(cache.get("A"), Some("a2"));
    }

    #[test]
    fn test_evicts_several_for_one_large() {
        let cache: ImageCache<u32> = ImageCache::new(100);
        for i in 0..10 {
            cache.put(format!("k{i}"), i, 10);
        }
        assert_eq!(cache.resident_weight(), 100);
        cache.put("big", 99, 35);
        assert_eq!(cache.resident_weight(), 95);
        for i in 0..4 {
            assert!(!cache.contains(&format!("k{i}")));
        }
        assert!(cache.contains("k4"));
    }

    #[test]
    fn test_clear() {
        let cache: ImageCache<&str> = ImageCache::new(100);
        cache.put("A", "a", 40);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.resident_weight(), 0);
    }

    #[test]
    fn test_from_budget() {
        let cache: ImageCache<&str> =
            ImageCache::from_budget(DEFAULT_MEMORY_BUDGET, DEFAULT_BUDGET_FRACTION);
        assert_eq!(cache.capacity(), 32 * 1024 * 1024);
        let cache: ImageCache<&str> = ImageCache::from_budget(1000, 0);
        assert_eq!(cache.capacity(), 1000);
    }
}
