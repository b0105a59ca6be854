//! Result cache
//!
//! Bounded, least-recently-used memo of certitudes keyed by a fingerprint of the
//! exact input a backend would otherwise re-evaluate. One generator owns one
//! cache; tasks hold an `Arc` share of it.
//!
//! The cache is guarded by a single mutex and never held across a backend call,
//! so it does not de-duplicate in-flight work: two concurrent misses on the same
//! fingerprint both invoke the backend and the later insert wins.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Cache key derived from a backend input
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// SHA-256 of `namespace` and the canonical JSON text of `input`
    pub fn of(namespace: &str, input: &Value) -> Self {
        Self::of_str(namespace, &input.to_string())
    }

    /// SHA-256 of `namespace` and a raw string input
    pub fn of_str(namespace: &str, input: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        hasher.update([0u8]);
        hasher.update(input.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Memoized outcome of one backend evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult {
    pub certitude: u32,
    pub payload: Option<Value>,
}

impl CachedResult {
    pub fn certitude(certitude: u32) -> Self {
        Self {
            certitude,
            payload: None,
        }
    }

    pub fn with_payload(certitude: u32, payload: Value) -> Self {
        Self {
            certitude,
            payload: Some(payload),
        }
    }
}

struct Slot<V> {
    value: V,
    stamp: u64,
}

/// Single-threaded LRU map
///
/// Recency is a monotonically increasing stamp; `order` maps stamps back to keys
/// so the oldest entry is always the first one in the tree.
pub struct LruCache<K, V> {
    capacity: usize,
    clock: u64,
    entries: HashMap<K, Slot<V>>,
    order: BTreeMap<u64, K>,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clock: 0,
            entries: HashMap::with_capacity(capacity.min(4096)),
            order: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `key`, marking it most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let stamp = self.next_stamp();
        let slot = self.entries.get_mut(key)?;
        self.order.remove(&slot.stamp);
        slot.stamp = stamp;
        self.order.insert(stamp, key.clone());
        Some(&slot.value)
    }

    /// Insert or overwrite `key`, returning the key evicted to make room, if any
    pub fn put(&mut self, key: K, value: V) -> Option<K> {
        if self.capacity == 0 {
            return None;
        }

        let stamp = self.next_stamp();
        if let Some(slot) = self.entries.get_mut(&key) {
            self.order.remove(&slot.stamp);
            slot.value = value;
            slot.stamp = stamp;
            self.order.insert(stamp, key);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        self.order.insert(stamp, key.clone());
        self.entries.insert(key, Slot { value, stamp });
        evicted
    }

    fn evict_oldest(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }

    fn next_stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Counters exposed by [`ResultCache::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Concurrency-safe result cache shared by every task of one generator
pub struct ResultCache {
    inner: Mutex<LruCache<Fingerprint, CachedResult>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// Create a cache holding at most `capacity` entries; 0 disables caching
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity() > 0
    }

    pub fn capacity(&self) -> usize {
        self.guard().capacity()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn lookup(&self, key: &Fingerprint) -> Option<CachedResult> {
        let found = self.guard().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, key: Fingerprint, value: CachedResult) {
        if let Some(evicted) = self.guard().put(key, value) {
            tracing::trace!(fingerprint = %evicted, "Evicted least recently used cache entry");
        }
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, capacity) = {
            let cache = self.guard();
            (cache.len(), cache.capacity())
        };
        CacheStats {
            entries,
            capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    // A panic elsewhere while holding the lock cannot leave a half-written slot:
    // every mutation above completes before the guard drops.
    fn guard(&self) -> std::sync::MutexGuard<'_, LruCache<Fingerprint, CachedResult>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(s: &str) -> Fingerprint {
        Fingerprint::of_str("test", s)
    }

    #[test]
    fn test_insert_then_lookup() {
        let cache = ResultCache::new(4);
        cache.insert(key("a.com"), CachedResult::certitude(42));
        assert_eq!(cache.lookup(&key("a.com")), Some(CachedResult::certitude(42)));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = ResultCache::new(2);
        cache.insert(key("a"), CachedResult::certitude(1));
        cache.insert(key("b"), CachedResult::certitude(2));

        // Touch "a" so "b" becomes the oldest
        assert!(cache.lookup(&key("a")).is_some());
        cache.insert(key("c"), CachedResult::certitude(3));

        assert!(cache.lookup(&key("b")).is_none());
        assert!(cache.lookup(&key("a")).is_some());
        assert!(cache.lookup(&key("c")).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_overwrite_refreshes_recency() {
        let cache = ResultCache::new(2);
        cache.insert(key("a"), CachedResult::certitude(1));
        cache.insert(key("b"), CachedResult::certitude(2));
        cache.insert(key("a"), CachedResult::certitude(10));
        cache.insert(key("c"), CachedResult::certitude(3));

        assert_eq!(cache.lookup(&key("a")), Some(CachedResult::certitude(10)));
        assert!(cache.lookup(&key("b")).is_none());
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = ResultCache::new(0);
        assert!(!cache.is_enabled());
        cache.insert(key("a"), CachedResult::certitude(1));
        assert!(cache.lookup(&key("a")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let cache = ResultCache::new(8);
        cache.insert(key("a"), CachedResult::with_payload(5, json!({"k": 1})));
        cache.lookup(&key("a"));
        cache.lookup(&key("a"));
        cache.lookup(&key("zzz"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.capacity, 8);
    }

    #[test]
    fn test_fingerprint_depends_on_namespace_and_input() {
        let a = Fingerprint::of("hostlookup", &json!("a.com"));
        assert_eq!(a, Fingerprint::of("hostlookup", &json!("a.com")));
        assert_ne!(a, Fingerprint::of("user_agent", &json!("a.com")));
        assert_ne!(a, Fingerprint::of("hostlookup", &json!("b.com")));
        assert_eq!(a.as_str().len(), 64);
    }
}
