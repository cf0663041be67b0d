//! TTL result cache.
//!
//! Entries carry an absolute expiry and are checked lazily on read; there is
//! no background sweep. An expired entry found during a read is removed.
//!
//! The lock is never held while computing a value, so two concurrent misses
//! for the same key may both compute. The later write wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// `None` when `now + ttl` is not representable; such entries never expire.
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now <= at)
    }
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
}

/// Hit/miss counters and the number of stored entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Reads answered from a live entry.
    pub hits: u64,
    /// Reads that found nothing live.
    pub misses: u64,
    /// Stored entries, including expired ones not yet read.
    pub entries: usize,
}

/// Time-to-live memoization keyed by string.
#[derive(Debug)]
pub struct ResultCache<V = serde_json::Value> {
    inner: Mutex<Inner<V>>,
}

impl<V> Default for ResultCache<V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }
}

impl<V: Clone> ResultCache<V> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the live value for `key`, or run `op` and store its result for
    /// `ttl`.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, op: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = op().await;
        self.insert(key, value.clone(), ttl);
        value
    }

    /// Like [`get_or_compute`](Self::get_or_compute) with a fallible `op`.
    /// Errors are returned to the caller and not cached.
    ///
    /// # Errors
    ///
    /// Returns whatever `op` returns on failure.
    pub async fn try_get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        op: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = op().await?;
        self.insert(key, value.clone(), ttl);
        Ok(value)
    }

    /// Live value for `key`, if any. Counts as a hit or a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();

        let found = inner
            .entries
            .get(key)
            .map(|entry| entry.is_live(now).then(|| entry.value.clone()));
        let live = match found {
            Some(Some(value)) => Some(value),
            Some(None) => {
                inner.entries.remove(key);
                trace!(key, "Cache entry expired");
                None
            },
            None => None,
        };

        if live.is_some() {
            inner.hits = inner.hits.saturating_add(1);
        } else {
            inner.misses = inner.misses.saturating_add(1);
        }
        live
    }

    /// Store `value` under `key` for `ttl`, replacing any existing entry.
    pub fn insert(&self, key: &str, value: V, ttl: Duration) {
        let expires_at = Instant::now().checked_add(ttl);
        self.lock()
            .entries
            .insert(key.to_owned(), CacheEntry { value, expires_at });
    }

    /// Drop the entry for `key`. Returns whether one existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    async fn counted(cache: &ResultCache<u32>, calls: &AtomicUsize) -> u32 {
        cache
            .get_or_compute("k", TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                7
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_ttl_computes_once() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);

        assert_eq!(counted(&cache, &calls).await, 7);
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(counted(&cache, &calls).await, 7);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_boundary_is_inclusive() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);

        counted(&cache, &calls).await;
        tokio::time::advance(TTL).await;
        counted(&cache, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        counted(&cache, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_dropped_on_read() {
        let cache = ResultCache::new();
        cache.insert("k", 1_u32, Duration::from_secs(1));
        assert_eq!(cache.len(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache: ResultCache<u32> = ResultCache::new();

        let failed: Result<u32, &str> = cache
            .try_get_or_compute("k", TTL, || async { Err("boom") })
            .await;
        assert_eq!(failed, Err("boom"));
        assert!(cache.is_empty());

        let ok: Result<u32, &str> = cache.try_get_or_compute("k", TTL, || async { Ok(3) }).await;
        assert_eq!(ok, Ok(3));
        assert_eq!(cache.get("k"), Some(3));
    }

    #[tokio::test]
    async fn test_clear_and_invalidate() {
        let cache = ResultCache::new();
        cache.insert("a", 1_u32, TTL);
        cache.insert("b", 2_u32, TTL);

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let cache = ResultCache::new();
        cache.insert("k", 1_u32, Duration::MAX);
        assert_eq!(cache.get("k"), Some(1));
    }
}
