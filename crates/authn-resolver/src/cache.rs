//! Keyed refresh cache with single-flight refresh.
//!
//! Backs the discovery and JWKS caches. Each key maps to an immutable value
//! plus its fetch timestamp; a refresh replaces the value wholesale.
//!
//! # Concurrency
//!
//! - Readers of a fresh entry take only a short read lock on the entry map.
//! - Refreshes for one key are serialized by a per-key flight lock. Callers
//!   that queued behind an in-progress refresh receive its outcome instead of
//!   issuing another fetch, so N concurrent misses cost one round trip.
//! - Failed refreshes are retried with bounded exponential backoff. When every
//!   attempt fails and a previous value exists, the previous value is served
//!   and a warning is logged.

use crate::errors::AuthError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Default number of fetch attempts per refresh.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(200);

/// Upper bound for the retry delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Bounded retry policy for cache refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total fetch attempts per refresh (at least 1).
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per attempt up to `max_backoff`.
    pub initial_backoff: Duration,

    /// Upper bound for the retry delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// How a lookup treats an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Serve the cached value while it is fresh; fetch otherwise.
    IfStale,

    /// Fetch even if the cached value is fresh (e.g. unknown key id).
    Force,
}

/// Result of a cache lookup.
#[derive(Debug)]
pub struct Lookup<V> {
    /// The cached or freshly fetched value.
    pub value: Arc<V>,

    /// True if the value was fetched by this lookup or by the refresh it
    /// waited on.
    pub refreshed: bool,
}

struct CacheEntry<V> {
    value: Arc<V>,
    fetched_at: Instant,
    generation: u64,
    invalidated: bool,
}

/// Per-key refresh state. The mutex is held for the whole refresh and stores
/// the error of the most recent one.
#[derive(Default)]
struct Flight {
    completed: AtomicU64,
    last_error: Mutex<Option<AuthError>>,
}

/// Keyed cache whose refreshes are deduplicated per key.
pub struct RefreshCache<V> {
    name: &'static str,
    ttl: Option<Duration>,
    retry: RetryPolicy,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    flights: Mutex<HashMap<String, Arc<Flight>>>,
}

impl<V> RefreshCache<V> {
    /// Create an empty cache.
    ///
    /// `ttl = None` disables time-based expiry: entries are refreshed only on
    /// forced lookups or after [`RefreshCache::invalidate`].
    pub fn new(name: &'static str, ttl: Option<Duration>, retry: RetryPolicy) -> Self {
        Self {
            name,
            ttl,
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                ..retry
            },
            entries: RwLock::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Configured TTL.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        !entry.invalidated && self.ttl.map_or(true, |ttl| entry.fetched_at.elapsed() < ttl)
    }

    /// Look up `key`, running `fetch` when a refresh is required.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when every attempt failed and no previous
    /// value exists for `key`.
    pub async fn get<F, Fut>(&self, key: &str, mode: Refresh, fetch: F) -> Result<Lookup<V>, AuthError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V, AuthError>>,
    {
        let observed_generation = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if mode == Refresh::IfStale && self.is_fresh(entry) => {
                    return Ok(Lookup {
                        value: Arc::clone(&entry.value),
                        refreshed: false,
                    });
                }
                Some(entry) => entry.generation,
                None => 0,
            }
        };

        let flight = self.flight(key).await;
        let observed_flights = flight.completed.load(Ordering::Acquire);
        let mut last_error = flight.last_error.lock().await;

        // A refresh finished while we waited for the flight lock: share it.
        if flight.completed.load(Ordering::Acquire) != observed_flights {
            return match last_error.as_ref() {
                Some(err) => self.fallback(key, err.clone()).await,
                None => self.newer_than(key, observed_generation).await.ok_or_else(|| {
                    AuthError::Configuration(format!("{} cache entry vanished", self.name))
                }),
            };
        }
        if let Some(lookup) = self.newer_than(key, observed_generation).await {
            return Ok(lookup);
        }

        let outcome = self.fetch_with_retry(key, &fetch).await;
        let result = match outcome {
            Ok(value) => {
                *last_error = None;
                Ok(self.store(key, value).await)
            }
            Err(err) => {
                *last_error = Some(err.clone());
                self.fallback(key, err).await
            }
        };
        flight.completed.fetch_add(1, Ordering::AcqRel);
        result
    }

    /// Mark `key` stale. The old value is kept as a fallback for the next refresh.
    pub async fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.invalidated = true;
            tracing::debug!(target: "authn.cache", cache = self.name, key = %key, "Cache entry invalidated");
        }
    }

    async fn flight(&self, key: &str) -> Arc<Flight> {
        let mut flights = self.flights.lock().await;
        Arc::clone(flights.entry(key.to_string()).or_default())
    }

    async fn newer_than(&self, key: &str, generation: u64) -> Option<Lookup<V>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.generation > generation)
            .map(|entry| Lookup {
                value: Arc::clone(&entry.value),
                refreshed: true,
            })
    }

    async fn store(&self, key: &str, value: V) -> Lookup<V> {
        let value = Arc::new(value);
        let mut entries = self.entries.write().await;
        let generation = entries.get(key).map_or(0, |entry| entry.generation) + 1;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: Arc::clone(&value),
                fetched_at: Instant::now(),
                generation,
                invalidated: false,
            },
        );

        tracing::debug!(target: "authn.cache", cache = self.name, key = %key, generation, "Cache entry refreshed");

        Lookup {
            value,
            refreshed: true,
        }
    }

    async fn fallback(&self, key: &str, err: AuthError) -> Result<Lookup<V>, AuthError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) => {
                tracing::warn!(
                    target: "authn.cache",
                    cache = self.name,
                    key = %key,
                    error = %err,
                    "Refresh failed, serving previously cached value"
                );
                Ok(Lookup {
                    value: Arc::clone(&entry.value),
                    refreshed: false,
                })
            }
            None => Err(err),
        }
    }

    async fn fetch_with_retry<F, Fut>(&self, key: &str, fetch: &F) -> Result<V, AuthError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V, AuthError>>,
    {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;

        loop {
            match fetch().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        target: "authn.cache",
                        cache = self.name,
                        key = %key,
                        attempt,
                        error = %err,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Refresh attempt failed, will retry"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.retry.max_backoff);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
