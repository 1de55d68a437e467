//! Coalescing cache for realtime feed results.
//!
//! The registry owns one cache entry and at most one in-flight fetch per
//! feed key. Concurrent callers for the same key attach to the same pending
//! fetch; each bounds its own wait and degrades to the last published value
//! (or a well-formed default shape) instead of failing. The fetch itself is
//! owned by the cache, so no caller's timeout can cancel it: its result is
//! still published for whoever asks next.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::domain::StopsData;
use crate::fetch::FetchError;

/// Identifies one upstream feed (one provider endpoint).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FeedKey(Arc<str>);

impl FeedKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        FeedKey(Arc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedKey({})", self.0)
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the cache fetches when a key misses.
///
/// The production implementation is the provider registry (fetch + compose);
/// tests substitute doubles. `fallback` must produce the well-formed default
/// shape for the key: every configured stop present, empty line mappings.
#[async_trait]
pub trait FeedSource: Send + Sync + 'static {
    /// Fetch and compose a fresh result for the key.
    async fn load(&self, key: &FeedKey) -> Result<StopsData, FetchError>;

    /// The degraded default shape for the key.
    async fn fallback(&self, key: &FeedKey) -> StopsData;

    /// Rate-limit admission; checked only before starting a new fetch.
    fn can_fetch(&self, _key: &FeedKey) -> bool {
        true
    }
}

/// The last published result for a key.
///
/// `started_at` is the instant its fetch began: publishes are refused when
/// a newer fetch already published (freshness-monotonic).
struct CacheEntry {
    value: Arc<StopsData>,
    fetched_at: Instant,
    started_at: Instant,
}

/// Handle to the single running fetch for a key.
struct InFlight {
    started_at: Instant,
    done: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry>,
    in_flight: Option<InFlight>,
}

/// What a caller found under the slot lock.
enum Attempt {
    /// Fresh entry, returned as-is.
    Fresh(Arc<StopsData>),
    /// A fetch is pending (ours or someone else's); wait on it.
    Pending(watch::Receiver<bool>),
    /// Rate limiter refused admission and nothing is in flight.
    Denied,
}

struct Inner<S> {
    slots: Mutex<HashMap<FeedKey, Slot>>,
    source: S,
    config: CacheConfig,
}

/// Single-flight TTL cache over a [`FeedSource`].
///
/// Cheap to clone; all clones share the same registry.
pub struct FeedCache<S: FeedSource> {
    inner: Arc<Inner<S>>,
}

impl<S: FeedSource> Clone for FeedCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: FeedSource> FeedCache<S> {
    /// Create a cache over the given source.
    pub fn new(source: S, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                source,
                config,
            }),
        }
    }

    /// Get the feed result for a key using the configured TTL and timeout.
    pub async fn get(&self, key: &FeedKey) -> Arc<StopsData> {
        let CacheConfig {
            ttl,
            caller_timeout,
        } = self.inner.config;
        self.get_with(key, ttl, caller_timeout).await
    }

    /// Get the feed result for a key, with caller-supplied bounds.
    ///
    /// Never fails and never returns a partial payload: within `ttl` the
    /// last published value is returned directly; otherwise the caller
    /// attaches to the single in-flight fetch and waits at most
    /// `caller_timeout` before degrading to the last published value or the
    /// source's default shape.
    pub async fn get_with(
        &self,
        key: &FeedKey,
        ttl: Duration,
        caller_timeout: Duration,
    ) -> Arc<StopsData> {
        let attempt = self.attempt(key, ttl);

        let mut done = match attempt {
            Attempt::Fresh(value) => return value,
            Attempt::Denied => {
                debug!(%key, "fetch suppressed by rate limiter, serving degraded result");
                return self.latest_or_fallback(key).await;
            }
            Attempt::Pending(done) => done,
        };

        match tokio::time::timeout(caller_timeout, done.changed()).await {
            // Fetch settled (or its task died): serve whatever is newest.
            Ok(_) => self.latest_or_fallback(key).await,
            Err(_) => {
                debug!(%key, ?caller_timeout, "caller timed out waiting on fetch, serving degraded result");
                self.latest_or_fallback(key).await
            }
        }
    }

    /// Abort all in-flight fetches (process shutdown).
    ///
    /// An aborted fetch never publishes; waiting callers wake immediately
    /// and take the degraded path.
    pub fn shutdown(&self) {
        let mut slots = self.inner.slots.lock().expect("cache slots poisoned");
        for slot in slots.values_mut() {
            if let Some(in_flight) = slot.in_flight.take() {
                in_flight.task.abort();
            }
        }
    }

    /// One linearizable pass under the slot lock: serve fresh, attach to the
    /// pending fetch, or become the single caller that starts one.
    fn attempt(&self, key: &FeedKey, ttl: Duration) -> Attempt {
        let mut slots = self.inner.slots.lock().expect("cache slots poisoned");
        let slot = slots.entry(key.clone()).or_default();

        if let Some(entry) = &slot.entry {
            if entry.fetched_at.elapsed() < ttl {
                return Attempt::Fresh(entry.value.clone());
            }
        }

        // A fetch task that died without settling (abort, panic) leaves a
        // closed channel behind; clear it so the key heals back to idle.
        if slot
            .in_flight
            .as_ref()
            .is_some_and(|f| f.done.has_changed().is_err())
        {
            slot.in_flight = None;
        }

        if let Some(in_flight) = &slot.in_flight {
            debug!(
                %key,
                in_flight_for = ?in_flight.started_at.elapsed(),
                "attaching to in-flight fetch"
            );
            return Attempt::Pending(in_flight.done.clone());
        }

        if !self.inner.source.can_fetch(key) {
            return Attempt::Denied;
        }

        let (tx, done) = watch::channel(false);
        let started_at = Instant::now();
        let cache = self.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let result = cache.inner.source.load(&task_key).await;
            cache.settle(&task_key, started_at, result);
            let _ = tx.send(true);
        });

        slot.in_flight = Some(InFlight {
            started_at,
            done: done.clone(),
            task,
        });

        Attempt::Pending(done)
    }

    /// Record a settled fetch: clear the in-flight marker and publish the
    /// value unless a newer fetch already published.
    fn settle(&self, key: &FeedKey, started_at: Instant, result: Result<StopsData, FetchError>) {
        let mut slots = self.inner.slots.lock().expect("cache slots poisoned");
        let slot = slots.entry(key.clone()).or_default();
        slot.in_flight = None;

        match result {
            Ok(value) => {
                let superseded = slot
                    .entry
                    .as_ref()
                    .is_some_and(|entry| entry.started_at > started_at);
                if superseded {
                    debug!(%key, "discarding out-of-order fetch result");
                    return;
                }
                slot.entry = Some(CacheEntry {
                    value: Arc::new(value),
                    fetched_at: Instant::now(),
                    started_at,
                });
            }
            Err(e) => {
                warn!(%key, error = %e, "feed fetch failed, keeping last published result");
            }
        }
    }

    /// The last published value regardless of TTL, or the default shape.
    async fn latest_or_fallback(&self, key: &FeedKey) -> Arc<StopsData> {
        let latest = {
            let slots = self.inner.slots.lock().expect("cache slots poisoned");
            slots
                .get(key)
                .and_then(|slot| slot.entry.as_ref())
                .map(|entry| entry.value.clone())
        };

        match latest {
            Some(value) => value,
            None => Arc::new(self.inner.source.fallback(key).await),
        }
    }
}
