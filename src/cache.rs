//! Bounded TTL cache used for memoizing pure functions

use moka::notification::RemovalCause;
use moka::sync::Cache;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct MemoCacheConfig {
    pub ttl: Duration,
    pub max_size: u64,
}

impl Default for MemoCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            max_size: 1000,
        }
    }
}

/// Callback invoked when an entry leaves the cache for a reason other than
/// an explicit overwrite
pub type EvictionCallback<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;

/// Key -> value cache with TTL, capacity bound and hit/miss accounting
pub struct MemoCache<K, V> {
    entries: Cache<K, V>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> MemoCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a new cache with TTL and max size
    pub fn new(config: MemoCacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_size)
            .time_to_live(config.ttl)
            .build();
        Self::from_cache(entries)
    }

    /// Create a cache that reports expirations and capacity evictions
    pub fn with_eviction_callback(config: MemoCacheConfig, on_evict: EvictionCallback<K, V>) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_size)
            .time_to_live(config.ttl)
            .eviction_listener(move |key: Arc<K>, value: V, cause: RemovalCause| {
                if cause.was_evicted() {
                    on_evict(&key, &value);
                }
            })
            .build();
        Self::from_cache(entries)
    }

    fn from_cache(entries: Cache<K, V>) -> Self {
        Self {
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a cached value if present and not expired
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.entries.get(key);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    pub fn get_or_compute<F>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.entries.insert(key, value.clone());
        value
    }

    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }

    /// Apply pending expirations and evictions now
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
}

/// A pure function wrapped with a [`MemoCache`]
///
/// `key` derives the cache key from the argument; `compute` must depend on
/// nothing but its argument.
pub struct Memoized<A: ?Sized, K, V> {
    cache: MemoCache<K, V>,
    key: fn(&A) -> K,
    compute: fn(&A) -> V,
}

impl<A, K, V> Memoized<A, K, V>
where
    A: ?Sized,
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(cache: MemoCache<K, V>, key: fn(&A) -> K, compute: fn(&A) -> V) -> Self {
        Self { cache, key, compute }
    }

    pub fn call(&self, arg: &A) -> V {
        let compute = self.compute;
        self.cache.get_or_compute((self.key)(arg), || compute(arg))
    }

    pub fn cache(&self) -> &MemoCache<K, V> {
        &self.cache
    }
}
