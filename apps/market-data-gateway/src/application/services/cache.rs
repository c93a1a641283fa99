//! TTL Cache
//!
//! Key → value store with per-entry expiry and a single-flight read-through
//! path. Entries are evicted lazily on read and by a periodic sweep.
//!
//! Concurrent misses on the same key share one upstream fetch; every waiter
//! receives the same value or the same error. Failed fetches are never
//! stored. When two fetches for a key overlap, the one that started later
//! wins regardless of completion order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::MarketDataError;
use crate::infrastructure::metrics::{self, CacheResult};

type FetchResult<V> = Result<V, MarketDataError>;
type SharedFetch<V> = Shared<BoxFuture<'static, FetchResult<V>>>;

struct Entry<V> {
    value: V,
    expires_at: Instant,
    fetch_started: Instant,
}

struct Inner<V> {
    name: &'static str,
    entries: RwLock<HashMap<String, Entry<V>>>,
    inflight: Mutex<HashMap<String, SharedFetch<V>>>,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Resident entries, including expired ones not yet swept.
    pub entries: usize,
    /// Fetches currently in flight.
    pub inflight: usize,
}

/// Shared TTL cache. Cloning yields another handle to the same store.
pub struct TtlCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.inner.name)
            .field("entries", &self.inner.entries.read().len())
            .finish_non_exhaustive()
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty cache. `name` labels its metrics.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                entries: RwLock::new(HashMap::new()),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Fresh value for `key`, evicting it if expired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key)
    }

    /// Store `value` for `ttl` from now.
    ///
    /// Treated as a fetch that started now, so it supersedes any entry
    /// produced by an earlier fetch.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.inner.store(key.into(), value, ttl, Instant::now());
    }

    /// Drop the entry for `key`, if any.
    pub fn invalidate(&self, key: &str) {
        self.inner.entries.write().remove(key);
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.inner.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Resident entries, including expired ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Whether no entries are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            inflight: self.inner.inflight.lock().len(),
        }
    }

    /// Read-through lookup.
    ///
    /// Returns the cached value when fresh. Otherwise joins the fetch already
    /// in flight for `key`, or starts one with `fetch`. A successful result
    /// is stored for `ttl`; an error is returned to every waiter and leaves
    /// the cache untouched.
    ///
    /// # Errors
    ///
    /// Returns the fetch's error.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> FetchResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let prefix = key_prefix(key);

        if let Some(value) = self.get(key) {
            metrics::record_cache_lookup(prefix, CacheResult::Hit);
            return Ok(value);
        }

        let shared = {
            let mut inflight = self.inner.inflight.lock();

            if let Some(existing) = inflight.get(key) {
                metrics::record_cache_lookup(prefix, CacheResult::Coalesced);
                existing.clone()
            } else if let Some(value) = self.get(key) {
                // Filled by a fetch that finished after our first look.
                metrics::record_cache_lookup(prefix, CacheResult::Hit);
                return Ok(value);
            } else {
                metrics::record_cache_lookup(prefix, CacheResult::Miss);
                let task = self.spawn_fetch(key.to_string(), ttl, fetch());
                inflight.insert(key.to_string(), task.clone());
                task
            }
        };

        shared.await
    }

    fn spawn_fetch<Fut>(&self, key: String, ttl: Duration, fut: Fut) -> SharedFetch<V>
    where
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let started = Instant::now();
        let inner: Weak<Inner<V>> = Arc::downgrade(&self.inner);

        // Runs to completion even if every waiter is dropped. Callers hold
        // the inflight lock here, so removal cannot race the insert.
        let task = tokio::spawn(async move {
            let result = fut.await;
            if let Some(inner) = inner.upgrade() {
                if let Ok(value) = &result {
                    inner.store(key.clone(), value.clone(), ttl, started);
                }
                inner.inflight.lock().remove(&key);
            }
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(MarketDataError::unavailable(format!("fetch task failed: {e}")))
            })
        }
        .boxed()
        .shared()
    }

    /// Spawn a task purging expired entries every `interval` until
    /// `cancel` fires.
    pub fn spawn_sweeper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired();
                        let remaining = cache.len();
                        metrics::set_cache_entries(cache.inner.name, remaining);
                        if removed > 0 {
                            tracing::debug!(
                                cache = cache.inner.name,
                                removed,
                                remaining,
                                "Swept expired cache entries"
                            );
                        }
                    }
                }
            }
        })
    }
}

impl<V: Clone> Inner<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
            entries.remove(key);
        }
        None
    }

    fn store(&self, key: String, value: V, ttl: Duration, fetch_started: Instant) {
        let mut entries = self.entries.write();
        if let Some(current) = entries.get(&key) {
            if current.fetch_started > fetch_started {
                tracing::trace!(cache = self.name, key, "Discarded out-of-order cache write");
                return;
            }
        }
        entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
                fetch_started,
            },
        );
    }
}

/// Portion of a key before the first `:` (e.g. `quote` in `quote:AAPL`).
fn key_prefix(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn set_then_get_until_expiry() {
        let cache = TtlCache::new("test");
        cache.set("quote:AAPL", 1_u32, TTL);
        assert_eq!(cache.get("quote:AAPL"), Some(1));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("quote:AAPL"), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("quote:AAPL"), None);
        // Lazily evicted
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_refreshes_expiry() {
        let cache = TtlCache::new("test");
        cache.set("k", 1_u32, TTL);
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.set("k", 2_u32, TTL);
        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = TtlCache::new("test");
        cache.set("k", 1_u32, TTL);
        cache.invalidate("k");
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let cache = TtlCache::new("test");
        cache.set("short", 1_u32, Duration::from_secs(5));
        cache.set("long", 2_u32, Duration::from_secs(500));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn older_fetch_cannot_overwrite_newer() {
        let cache: TtlCache<u32> = TtlCache::new("test");
        let early = Instant::now();
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.set("k", 2, TTL);

        cache.inner.store("k".to_string(), 1, TTL, early);
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let cache: TtlCache<u32> = TtlCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("candles:AAPL:1M", TTL, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("candles:AAPL:1M"), Some(42));
        assert_eq!(cache.stats().inflight, 0);
    }

    #[tokio::test]
    async fn fetch_completes_after_last_waiter_is_dropped() {
        let cache: TtlCache<u32> = TtlCache::new("test");
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch("quote:AAPL", TTL, move || async move {
                        let _ = gate.await;
                        Ok(7)
                    })
                    .await
            })
        };
        while cache.stats().inflight == 0 {
            tokio::task::yield_now().await;
        }

        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        release.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while cache.get("quote:AAPL").is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(cache.get("quote:AAPL"), Some(7));
        assert_eq!(cache.stats().inflight, 0);
    }

    #[tokio::test]
    async fn errors_are_shared_and_not_cached() {
        let cache: TtlCache<u32> = TtlCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err(MarketDataError::unavailable("boom"))
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch("quote:X", TTL, fetch(Arc::clone(&calls))),
            cache.get_or_fetch("quote:X", TTL, fetch(Arc::clone(&calls))),
        );
        assert_eq!(a, Err(MarketDataError::unavailable("boom")));
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());

        // Next caller retries upstream.
        let _ = cache
            .get_or_fetch("quote:X", TTL, fetch(Arc::clone(&calls)))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn hit_skips_fetch() {
        let cache: TtlCache<u32> = TtlCache::new("test");
        cache.set("quote:AAPL", 7, TTL);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let value = cache
            .get_or_fetch("quote:AAPL", TTL, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            })
            .await;
        assert_eq!(value, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_on_cancel() {
        let cache: TtlCache<u32> = TtlCache::new("test");
        cache.set("k", 1, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_secs(10), cancel.clone());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(cache.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn prefix_extraction() {
        assert_eq!(key_prefix("quote:AAPL"), "quote");
        assert_eq!(key_prefix("plain"), "plain");
    }
}
