//! In-process TTL cache with LRU eviction and a single-flight read-through
//! coordinator.
//!
//! One `TtlCache` instance is created at startup and handed to every
//! consumer; all state lives behind a single mutex per instance. The
//! `get_or_fetch` coordinator is what keeps a herd of concurrent readers
//! from recomputing the same expensive value: only the caller that wins
//! the critical section runs the fetch, everyone else re-checks and takes
//! the refreshed entry.

pub mod stats;

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};

pub use stats::{CacheStats, EntryStats};

struct CacheEntry<V> {
    value: V,
    /// Wall-clock time of the store, reported in `stats()`.
    cached_at: DateTime<Utc>,
    /// Monotonic time of the store, used for expiry math.
    stored: Instant,
    /// Tag of this entry's newest pair in the recency queue; older pairs
    /// for the same key are stale.
    generation: u64,
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Recency queue, front = least recently touched. Touches append a
    /// `(key, generation)` pair instead of moving the old one, so each
    /// touch is amortized O(1); stale pairs are skipped during eviction
    /// and dropped wholesale by `compact`.
    order: VecDeque<(String, u64)>,
    next_generation: u64,
    hits: u64,
    misses: u64,
}

impl<V: Clone> CacheInner<V> {
    fn touch(&mut self, key: &str) {
        self.next_generation += 1;
        let generation = self.next_generation;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.generation = generation;
        }
        self.order.push_back((key.to_string(), generation));
        self.compact();
    }

    fn is_live(&self, key: &str, generation: u64) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.generation == generation)
    }

    /// Rebuilds the recency queue once stale pairs dominate it.
    fn compact(&mut self) {
        if self.order.len() > 2 * self.entries.len() + 8 {
            let entries = &self.entries;
            self.order
                .retain(|(key, generation)| {
                    entries.get(key).is_some_and(|e| e.generation == *generation)
                });
        }
    }

    /// Returns the value if present and within `ttl`, bumping recency.
    fn get_fresh(&mut self, key: &str, ttl: Duration) -> Option<V> {
        let value = match self.entries.get(key) {
            Some(entry) if entry.stored.elapsed() <= ttl => entry.value.clone(),
            _ => return None,
        };
        self.touch(key);
        Some(value)
    }

    fn insert(&mut self, key: &str, value: V, max_size: usize) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                cached_at: Utc::now(),
                stored: Instant::now(),
                generation: 0,
            },
        );
        self.touch(key);

        while self.entries.len() > max_size {
            let Some((oldest, generation)) = self.order.pop_front() else {
                break;
            };
            if self.is_live(&oldest, generation) {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// Thread-safe key/value cache with per-read TTL checks and LRU eviction.
pub struct TtlCache<V> {
    inner: Mutex<CacheInner<V>>,
    max_size: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                next_generation: 0,
                hits: 0,
                misses: 0,
            }),
            max_size,
        }
    }

    // A poisoned lock only means a fetch closure panicked mid-flight; the
    // map itself is never left half-updated, so recover the guard.
    fn lock(&self) -> MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the cached value if present, bumping its recency.
    ///
    /// Does not consult any TTL and does not count hits or misses; expiry
    /// and metrics are the coordinator's job in [`TtlCache::get_or_fetch`].
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let value = inner.entries.get(key).map(|e| e.value.clone())?;
        inner.touch(key);
        Some(value)
    }

    /// Stores a value with the current timestamp, evicting the least
    /// recently touched entries while the cache is over capacity.
    pub fn set(&self, key: &str, value: V) {
        self.lock().insert(key, value, self.max_size);
    }

    /// True if the key is absent or its entry is older than `ttl`.
    pub fn is_expired(&self, key: &str, ttl: Duration) -> bool {
        match self.lock().entries.get(key) {
            Some(entry) => entry.stored.elapsed() > ttl,
            None => true,
        }
    }

    /// Removes one key; used by mutation endpoints right after commit so
    /// staleness is bounded by the next read, not by the TTL. The key's
    /// recency pairs go stale and are dropped lazily.
    pub fn invalidate(&self, key: &str) {
        self.lock().entries.remove(key);
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let total = inner.hits + inner.misses;
        let hit_rate = if total > 0 {
            inner.hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let entries = inner
            .entries
            .iter()
            .map(|(key, entry)| {
                (
                    key.clone(),
                    EntryStats {
                        age_seconds: entry.stored.elapsed().as_secs_f64(),
                        cached_at: entry.cached_at,
                    },
                )
            })
            .collect();

        CacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate_percent: hit_rate,
            entries,
        }
    }

    /// Read-through with single-flight refresh.
    ///
    /// Double-checked: the first critical section is the fast path for the
    /// common fresh-hit case. On a miss the lock is re-acquired and the
    /// entry re-checked, because a racing caller may have refreshed it
    /// while we waited; only the winner of that race runs `fetch`, while
    /// holding the lock, so the backend sees at most one recomputation per
    /// key per TTL window. A `fetch` error propagates and caches nothing.
    pub fn get_or_fetch<F>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        {
            let mut inner = self.lock();
            if let Some(value) = inner.get_fresh(key, ttl) {
                inner.hits += 1;
                return Ok(value);
            }
        }

        let mut inner = self.lock();
        if let Some(value) = inner.get_fresh(key, ttl) {
            inner.hits += 1;
            return Ok(value);
        }

        inner.misses += 1;
        let value = fetch()?;
        inner.insert(key, value.clone(), self.max_size);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn set_then_get_returns_value() {
        let cache = TtlCache::new(10);
        cache.set("a", 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn entry_expires_after_ttl() {
        let cache = TtlCache::new(10);
        cache.set("a", 1);
        let ttl = Duration::from_millis(40);
        assert!(!cache.is_expired("a", ttl));
        thread::sleep(Duration::from_millis(60));
        assert!(cache.is_expired("a", ttl));
        // get does not consult the TTL; the stale value is still readable
        assert_eq!(cache.get("a"), Some(1));
    }

    #[test]
    fn absent_key_is_expired() {
        let cache: TtlCache<i32> = TtlCache::new(10);
        assert!(cache.is_expired("nope", Duration::from_secs(60)));
    }

    #[test]
    fn evicts_least_recently_touched() {
        let cache = TtlCache::new(3);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        // touch "a" so "b" becomes the eviction candidate
        assert_eq!(cache.get("a"), Some(1));
        cache.set("d", 4);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn eviction_at_capacity_two() {
        let cache = TtlCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn repeated_touches_do_not_skew_eviction() {
        let cache = TtlCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        // pile up stale recency pairs for "a", past the compaction bound
        for _ in 0..50 {
            assert_eq!(cache.get("a"), Some(1));
        }
        cache.set("c", 3);
        // "b" is the least recently touched despite all of "a"'s churn
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn eviction_skips_invalidated_keys() {
        let cache = TtlCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.invalidate("a");
        cache.set("c", 3);
        cache.set("d", 4);
        // "a"'s stale pair must not count as the eviction victim
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = TtlCache::new(10);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.invalidate("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        cache.clear();
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = TtlCache::new(10);
        let ttl = Duration::from_secs(10);
        cache
            .get_or_fetch("k", ttl, || Ok(7))
            .unwrap();
        cache
            .get_or_fetch("k", ttl, || panic!("must not refetch"))
            .unwrap();

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_size, 10);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate_percent - 50.0).abs() < f64::EPSILON);
        assert!(stats.entries.contains_key("k"));
        assert!(stats.entries["k"].age_seconds >= 0.0);
    }

    #[test]
    fn get_or_fetch_refetches_after_expiry() {
        let cache = TtlCache::new(10);
        let calls = AtomicUsize::new(0);
        let ttl = Duration::from_millis(30);

        let fetch = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        };
        cache.get_or_fetch("k", ttl, fetch).unwrap();
        thread::sleep(Duration::from_millis(50));
        cache.get_or_fetch("k", ttl, fetch).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fetch_error_caches_nothing() {
        let cache: TtlCache<i32> = TtlCache::new(10);
        let ttl = Duration::from_secs(10);

        let err = cache.get_or_fetch("k", ttl, || anyhow::bail!("backend down"));
        assert!(err.is_err());
        assert_eq!(cache.get("k"), None);

        // next caller fetches again and succeeds
        let value = cache.get_or_fetch("k", ttl, || Ok(5)).unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn concurrent_get_or_fetch_runs_fetch_once() {
        let cache = Arc::new(TtlCache::new(10));
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(20));
        let ttl = Duration::from_secs(10);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_fetch("x", ttl, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            // widen the race window
                            thread::sleep(Duration::from_millis(50));
                            Ok(123)
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 123);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 19);
    }
}
