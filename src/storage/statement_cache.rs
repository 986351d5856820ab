// src/storage/statement_cache.rs
//! Bounded, strategy-driven cache for fetched federation statements.
//!
//! Provides:
//! - LRU eviction with a resizable maximum size
//! - Optional time-to-live, after which entries count as stale
//! - HTTP validators (`ETag` / `Last-Modified`) stored alongside values, so a
//!   stale entry can be revalidated with a conditional request
//! - At most one in-flight creation per key: concurrent callers for the same
//!   key wait for the single creation instead of issuing their own
//!
//! No lock is held while a creation function runs.
//!
//! # Example
//! ```
//! use federation_trust::storage::statement_cache::{CacheOptions, CacheStrategy, StatementCache};
//!
//! let cache: StatementCache<String, String> = StatementCache::new(10);
//! let value = tokio_test::block_on(cache.get_or_put(
//!     "https://op.example.com/.well-known/openid-federation".to_string(),
//!     || async { Ok::<_, ()>("eyJ...".to_string()) },
//!     CacheOptions::new(CacheStrategy::CacheFirst),
//! ));
//! assert_eq!(value, Ok(Some("eyJ...".to_string())));
//! assert_eq!(cache.current_size(), 1);
//! ```

use log::{debug, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// How a lookup treats the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStrategy {
    /// Serve a fresh cached value, otherwise create and store one
    #[default]
    CacheFirst,
    /// Serve whatever is cached (any age); never create
    CacheOnly,
    /// Always create and overwrite, ignoring any cached value
    ForceRemote,
}

/// Per-call cache options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheOptions {
    pub strategy: CacheStrategy,
}

impl CacheOptions {
    pub fn new(strategy: CacheStrategy) -> Self {
        CacheOptions { strategy }
    }
}

impl From<CacheStrategy> for CacheOptions {
    fn from(strategy: CacheStrategy) -> Self {
        CacheOptions::new(strategy)
    }
}

/// HTTP validators remembered for a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheValidators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheValidators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Outcome of a (possibly conditional) refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revalidation<V> {
    /// A new value, with whatever validators came with it
    Modified { value: V, validators: CacheValidators },
    /// The held value is still current; only its freshness is renewed
    NotModified,
}

struct CacheEntry<V> {
    value: V,
    validators: CacheValidators,
    refreshed_at: Instant,
    last_access: u64,
}

struct InFlight {
    id: u64,
    done: watch::Receiver<()>,
}

struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// access tick -> key, oldest first
    recency: BTreeMap<u64, K>,
    in_flight: HashMap<K, InFlight>,
    clock: u64,
    max_size: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> CacheState<K, V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: &K) {
        let tick = self.tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.last_access);
            entry.last_access = tick;
            self.recency.insert(tick, key.clone());
        }
    }

    /// Returns the value if present and, when `ttl` is given, still fresh.
    fn lookup(&mut self, key: &K, ttl: Option<Duration>) -> Option<V> {
        let entry = self.entries.get(key)?;
        if let Some(ttl) = ttl {
            if entry.refreshed_at.elapsed() >= ttl {
                return None;
            }
        }
        let value = entry.value.clone();
        self.touch(key);
        Some(value)
    }

    fn insert(&mut self, key: K, value: V, validators: CacheValidators) -> usize {
        let tick = self.tick();
        let entry = CacheEntry {
            value,
            validators,
            refreshed_at: Instant::now(),
            last_access: tick,
        };
        if let Some(previous) = self.entries.insert(key.clone(), entry) {
            self.recency.remove(&previous.last_access);
        }
        self.recency.insert(tick, key);
        self.evict_to(self.max_size)
    }

    /// Renews freshness without touching the value; re-inserts if the entry
    /// disappeared while a revalidation was in flight.
    fn refresh(&mut self, key: K, value: V, validators: CacheValidators) -> usize {
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.refreshed_at = Instant::now();
                self.touch(&key);
                0
            }
            None => self.insert(key, value, validators),
        }
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_access);
        Some(entry.value)
    }

    fn evict_to(&mut self, max_size: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > max_size {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&key);
            evicted += 1;
        }
        evicted
    }
}

/// Thread-safe LRU cache keyed by resolution key (endpoint plus query).
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct StatementCache<K, V> {
    state: Mutex<CacheState<K, V>>,
    ttl: Option<Duration>,
}

impl<K, V> StatementCache<K, V> {
    fn lock(&self) -> MutexGuard<'_, CacheState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> StatementCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    /// Creates a cache holding at most `max_size` entries that never go stale.
    pub fn new(max_size: usize) -> Self {
        StatementCache {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                in_flight: HashMap::new(),
                clock: 0,
                max_size,
            }),
            ttl: None,
        }
    }

    /// Creates a cache whose entries go stale `ttl` after their last refresh.
    /// A zero `ttl` disables expiry.
    pub fn with_ttl(max_size: usize, ttl: Duration) -> Self {
        StatementCache {
            ttl: Some(ttl).filter(|ttl| !ttl.is_zero()),
            ..StatementCache::new(max_size)
        }
    }

    /// Looks up a value without ever creating one.
    ///
    /// `CacheFirst` returns only fresh values, `CacheOnly` returns any held
    /// value, and `ForceRemote` always returns `None`.
    pub fn get(&self, key: &K, options: CacheOptions) -> Option<V> {
        let mut state = self.lock();
        match options.strategy {
            CacheStrategy::CacheFirst => state.lookup(key, self.ttl),
            CacheStrategy::CacheOnly => state.lookup(key, None),
            CacheStrategy::ForceRemote => None,
        }
    }

    /// Stores a value without validators, evicting the least-recently-used
    /// entries if the cache is full.
    ///
    /// # Arguments
    /// * `key` - The cache key, usually a document URL
    /// * `value` - The value to store
    pub fn put(&self, key: K, value: V) {
        self.put_with_validators(key, value, CacheValidators::default());
    }

    /// Stores a value together with the HTTP validators it was served with.
    pub fn put_with_validators(&self, key: K, value: V, validators: CacheValidators) {
        let evicted = self.lock().insert(key, value, validators);
        if evicted > 0 {
            debug!("Statement cache evicted {} least-recently-used entries", evicted);
        }
    }

    /// Returns the cached value or creates, stores and returns a new one,
    /// according to `options.strategy`.
    ///
    /// Returns `Ok(None)` only for a `CacheOnly` miss.
    pub async fn get_or_put<F, Fut, E>(
        &self,
        key: K,
        create: F,
        options: CacheOptions,
    ) -> Result<Option<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.get_or_revalidate(
            key,
            |_| async move {
                create().await.map(|value| Revalidation::Modified {
                    value,
                    validators: CacheValidators::default(),
                })
            },
            options,
        )
        .await
    }

    /// Like [`get_or_put`](Self::get_or_put), but the creation function
    /// receives the validators of a stale entry and may answer
    /// [`Revalidation::NotModified`], which renews the entry's freshness
    /// without replacing its value.
    ///
    /// `ForceRemote` never passes validators. Concurrent callers for the same
    /// key wait for the one in-flight call; if it fails or is cancelled the
    /// next waiter takes over.
    pub async fn get_or_revalidate<F, Fut, E>(
        &self,
        key: K,
        revalidate: F,
        options: CacheOptions,
    ) -> Result<Option<V>, E>
    where
        F: FnOnce(Option<CacheValidators>) -> Fut,
        Fut: Future<Output = Result<Revalidation<V>, E>>,
    {
        let (guard, prior) = loop {
            let mut waiting = {
                let mut state = self.lock();
                match options.strategy {
                    CacheStrategy::CacheOnly => return Ok(state.lookup(&key, None)),
                    CacheStrategy::CacheFirst => {
                        if let Some(value) = state.lookup(&key, self.ttl) {
                            return Ok(Some(value));
                        }
                    }
                    CacheStrategy::ForceRemote => {}
                }

                match state.in_flight.get(&key) {
                    Some(in_flight) => in_flight.done.clone(),
                    None => {
                        let prior = match options.strategy {
                            CacheStrategy::ForceRemote => None,
                            _ => state
                                .entries
                                .get(&key)
                                .filter(|entry| !entry.validators.is_empty())
                                .map(|entry| (entry.value.clone(), entry.validators.clone())),
                        };
                        let (done_tx, done_rx) = watch::channel(());
                        let id = state.tick();
                        state.in_flight.insert(
                            key.clone(),
                            InFlight {
                                id,
                                done: done_rx,
                            },
                        );
                        let guard = InFlightGuard {
                            cache: self,
                            key: key.clone(),
                            id,
                            _done: done_tx,
                        };
                        break (guard, prior);
                    }
                }
            };
            debug!("Waiting for in-flight fetch of {:?}", key);
            // Err means the creator finished or was dropped; either way, look again.
            let _ = waiting.changed().await;
        };

        let outcome = revalidate(prior.as_ref().map(|(_, validators)| validators.clone())).await;
        let result = match outcome {
            Ok(Revalidation::Modified { value, validators }) => {
                let evicted = self.lock().insert(key, value.clone(), validators);
                if evicted > 0 {
                    debug!("Statement cache evicted {} least-recently-used entries", evicted);
                }
                Ok(Some(value))
            }
            Ok(Revalidation::NotModified) => match prior {
                Some((value, validators)) => {
                    debug!("Revalidated {:?}: not modified", key);
                    self.lock().refresh(key, value.clone(), validators);
                    Ok(Some(value))
                }
                None => {
                    warn!("Unconditional refresh of {:?} answered 'not modified'", key);
                    Ok(None)
                }
            },
            Err(err) => Err(err),
        };
        drop(guard);
        result
    }

    /// Removes and returns an entry.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().remove(key)
    }

    /// Drops every entry. In-flight creations still complete and store.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.recency.clear();
    }

    /// Changes the maximum size, evicting least-recently-used entries to fit.
    pub fn resize(&self, new_max: usize) {
        let mut state = self.lock();
        state.max_size = new_max;
        let evicted = state.evict_to(new_max);
        if evicted > 0 {
            debug!("Statement cache resized to {}, evicted {}", new_max, evicted);
        }
    }

    /// Number of entries currently held, fresh or stale.
    pub fn current_size(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn max_size(&self) -> usize {
        self.lock().max_size
    }

    /// Lists the cached keys.
    ///
    /// # Returns
    /// Keys ordered from least to most recently used.
    pub fn keys(&self) -> Vec<K> {
        self.lock().recency.values().cloned().collect()
    }

    /// Validators stored with an entry, if any.
    pub fn validators(&self, key: &K) -> Option<CacheValidators> {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.validators.clone())
    }
}

/// Deregisters an in-flight creation when the leader finishes, fails or is
/// cancelled. Dropping `_done` wakes every waiter.
struct InFlightGuard<'a, K: Eq + Hash, V> {
    cache: &'a StatementCache<K, V>,
    key: K,
    id: u64,
    _done: watch::Sender<()>,
}

impl<'a, K: Eq + Hash, V> Drop for InFlightGuard<'a, K, V> {
    fn drop(&mut self) {
        let mut state = self.cache.lock();
        let ours = state
            .in_flight
            .get(&self.key)
            .map_or(false, |in_flight| in_flight.id == self.id);
        if ours {
            state.in_flight.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(name: &str) -> String {
        format!("https://{}.example.com/.well-known/openid-federation", name)
    }

    const CACHE_FIRST: CacheOptions = CacheOptions {
        strategy: CacheStrategy::CacheFirst,
    };
    const CACHE_ONLY: CacheOptions = CacheOptions {
        strategy: CacheStrategy::CacheOnly,
    };
    const FORCE_REMOTE: CacheOptions = CacheOptions {
        strategy: CacheStrategy::ForceRemote,
    };

    async fn counted(
        cache: &StatementCache<String, String>,
        k: &str,
        value: &str,
        calls: &AtomicUsize,
        options: CacheOptions,
    ) -> Option<String> {
        cache
            .get_or_put(
                key(k),
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(value.to_string())
                },
                options,
            )
            .await
            .expect("creation does not fail")
    }

    #[tokio::test]
    async fn test_cache_only_never_creates() {
        let cache = StatementCache::new(4);
        let calls = AtomicUsize::new(0);

        assert_eq!(counted(&cache, "op", "v1", &calls, CACHE_ONLY).await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.current_size(), 0);
    }

    #[tokio::test]
    async fn test_cache_first_creates_once_until_removed() {
        let cache = StatementCache::new(4);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            assert_eq!(
                counted(&cache, "op", "v1", &calls, CACHE_FIRST).await.as_deref(),
                Some("v1")
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(cache.remove(&key("op")).as_deref(), Some("v1"));
        counted(&cache, "op", "v1", &calls, CACHE_FIRST).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_remote_always_creates_and_overwrites() {
        let cache = StatementCache::new(4);
        let calls = AtomicUsize::new(0);
        cache.put(key("op"), "stale".to_string());

        assert_eq!(
            counted(&cache, "op", "fresh", &calls, FORCE_REMOTE).await.as_deref(),
            Some("fresh")
        );
        counted(&cache, "op", "fresher", &calls, FORCE_REMOTE).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get(&key("op"), CACHE_ONLY).as_deref(), Some("fresher"));
        assert_eq!(cache.get(&key("op"), FORCE_REMOTE), None);
    }

    #[test]
    fn test_eviction_removes_least_recently_used() {
        let cache = StatementCache::new(2);
        cache.put(key("a"), "a".to_string());
        cache.put(key("b"), "b".to_string());
        // touching `a` makes `b` the eviction candidate
        assert!(cache.get(&key("a"), CACHE_FIRST).is_some());
        cache.put(key("c"), "c".to_string());

        assert_eq!(cache.current_size(), 2);
        assert!(cache.get(&key("b"), CACHE_ONLY).is_none());
        assert_eq!(cache.keys(), vec![key("a"), key("c")]);
    }

    #[test]
    fn test_size_never_exceeds_maximum() {
        let cache = StatementCache::new(3);
        for i in 0..50 {
            cache.put(format!("k{}", i % 7), i.to_string());
            assert!(cache.current_size() <= 3);
        }
    }

    #[test]
    fn test_overwrite_does_not_grow() {
        let cache = StatementCache::new(2);
        cache.put(key("a"), "1".to_string());
        cache.put(key("a"), "2".to_string());
        assert_eq!(cache.current_size(), 1);
        assert_eq!(cache.keys(), vec![key("a")]);
    }

    #[test]
    fn test_resize_and_clear() {
        let cache = StatementCache::new(5);
        for name in ["a", "b", "c", "d"] {
            cache.put(key(name), name.to_string());
        }
        cache.resize(2);
        assert_eq!(cache.max_size(), 2);
        assert_eq!(cache.keys(), vec![key("c"), key("d")]);

        cache.clear();
        assert_eq!(cache.current_size(), 0);
        assert!(cache.keys().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_creation() {
        let cache = StatementCache::new(4);
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;
        let create = move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>("v1".to_string())
        };

        let (a, b, c) = tokio::join!(
            cache.get_or_put(key("op"), create, CACHE_FIRST),
            cache.get_or_put(key("op"), create, CACHE_FIRST),
            cache.get_or_put(key("op"), create, CACHE_FIRST),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in [a, b, c] {
            assert_eq!(result.unwrap().as_deref(), Some("v1"));
        }
    }

    #[tokio::test]
    async fn test_failed_creation_is_not_cached() {
        let cache: StatementCache<String, String> = StatementCache::new(4);
        let failed = cache
            .get_or_put(key("op"), || async { Err::<String, _>("down") }, CACHE_FIRST)
            .await;
        assert_eq!(failed, Err("down"));
        assert_eq!(cache.current_size(), 0);

        let calls = AtomicUsize::new(0);
        counted(&cache, "op", "v1", &calls, CACHE_FIRST).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_creation_releases_the_key() {
        let cache: StatementCache<String, String> = StatementCache::new(4);
        let stalled = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_or_put(
                key("op"),
                || futures::future::pending::<Result<String, String>>(),
                CACHE_FIRST,
            ),
        )
        .await;
        assert!(stalled.is_err());

        let calls = AtomicUsize::new(0);
        assert_eq!(
            counted(&cache, "op", "v1", &calls, CACHE_FIRST).await.as_deref(),
            Some("v1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entries_are_served_only_cache_only() {
        let cache = StatementCache::with_ttl(4, Duration::from_secs(60));
        cache.put(key("op"), "v1".to_string());
        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(cache.get(&key("op"), CACHE_FIRST), None);
        assert_eq!(cache.get(&key("op"), CACHE_ONLY).as_deref(), Some("v1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_modified_renews_without_replacing() {
        let cache = StatementCache::with_ttl(4, Duration::from_secs(60));
        let etag = CacheValidators {
            etag: Some("\"v1\"".to_string()),
            last_modified: None,
        };
        cache.put_with_validators(key("op"), "v1".to_string(), etag.clone());
        tokio::time::advance(Duration::from_secs(120)).await;

        let seen = Mutex::new(None);
        let value = cache
            .get_or_revalidate(
                key("op"),
                |validators| {
                    *seen.lock().unwrap() = validators;
                    async { Ok::<_, String>(Revalidation::NotModified) }
                },
                CACHE_FIRST,
            )
            .await
            .unwrap();

        assert_eq!(value.as_deref(), Some("v1"));
        assert_eq!(seen.lock().unwrap().clone(), Some(etag.clone()));
        assert_eq!(cache.get(&key("op"), CACHE_FIRST).as_deref(), Some("v1"));
        assert_eq!(cache.validators(&key("op")), Some(etag));
    }

    #[tokio::test]
    async fn test_force_remote_sends_no_validators() {
        let cache = StatementCache::new(4);
        cache.put_with_validators(
            key("op"),
            "v1".to_string(),
            CacheValidators {
                etag: Some("\"v1\"".to_string()),
                last_modified: Some("Tue, 01 Oct 2024 00:00:00 GMT".to_string()),
            },
        );

        let value = cache
            .get_or_revalidate(
                key("op"),
                |validators| async move {
                    assert!(validators.is_none());
                    Ok::<_, String>(Revalidation::Modified {
                        value: "v2".to_string(),
                        validators: CacheValidators::default(),
                    })
                },
                FORCE_REMOTE,
            )
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("v2"));
        assert_eq!(cache.validators(&key("op")), Some(CacheValidators::default()));
    }
}
