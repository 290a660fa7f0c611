//! Keyed query cache with freshness windows and shared in-flight fetches.
//!
//! DESIGN
//! ======
//! Entries live in a plain `HashMap<String, Slot>` behind a mutex, so the key
//! set is enumerable and "drop everything" is a single well-defined call.
//! Each slot remembers its last value, its last error, when it was last
//! fetched, and at most one in-flight fetch. Concurrent readers of the same
//! key clone that fetch's `Shared` future instead of issuing another request.
//!
//! Every fetch carries an id and runs on its own spawned task, which writes
//! the result back before handing it to the readers. The write only lands if
//! the slot still points at that id: a fetch whose entry was cleared mid-flight
//! never resurrects it.
//!
//! Invalidating a key while its fetch is outstanding marks that fetch
//! superseded rather than forgetting it. The next reader chains a new fetch
//! behind it, so a key never has two requests open at once and the stale
//! answer is never written.
//!
//! TRADE-OFFS
//! ==========
//! Fetches outlive their readers: a reader that gives up does not cancel the
//! request, and the entry still settles and notifies subscribers. This needs
//! a Tokio runtime. The fetcher closure is called before the lock is taken and
//! its future is dropped unpolled on a hit or a join; the lock is never held
//! across an `.await`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::broadcast;
use tokio::time::Instant;

const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// PUBLIC TYPES
// =============================================================================

/// Outcome of the last completed fetch for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Created, but no fetch has completed yet.
    Idle,
    Success,
    Error,
}

/// Point-in-time view of one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V, E> {
    /// Last successfully fetched (or explicitly set) value.
    pub value: Option<V>,
    /// Error from the last fetch, if it failed.
    pub error: Option<E>,
    pub status: EntryStatus,
    /// `true` while the value may be served without a new fetch.
    pub fresh: bool,
    /// `true` while a fetch for this key is outstanding.
    pub fetching: bool,
}

/// Change notifications, one per mutation of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Fetching(String),
    Updated(String),
    Invalidated(String),
    Removed(String),
    Cleared,
}

// =============================================================================
// CACHE
// =============================================================================

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct InFlight<V, E> {
    id: u64,
    fetch: SharedFetch<V, E>,
    /// Invalidated while outstanding; its result is dropped on settle.
    superseded: bool,
}

struct Slot<V, E> {
    value: Option<V>,
    error: Option<E>,
    status: EntryStatus,
    updated_at: Option<Instant>,
    stale_time: Duration,
    invalidated: bool,
    in_flight: Option<InFlight<V, E>>,
}

impl<V: Clone, E: Clone> Slot<V, E> {
    fn new(stale_time: Duration) -> Self {
        Self {
            value: None,
            error: None,
            status: EntryStatus::Idle,
            updated_at: None,
            stale_time,
            invalidated: false,
            in_flight: None,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        if self.status != EntryStatus::Success || self.invalidated {
            return false;
        }
        self.updated_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.stale_time)
    }

    fn snapshot(&self, now: Instant) -> CacheEntry<V, E> {
        CacheEntry {
            value: self.value.clone(),
            error: self.error.clone(),
            status: self.status,
            fresh: self.is_fresh(now),
            fetching: self.in_flight.is_some(),
        }
    }
}

struct Inner<V, E> {
    entries: HashMap<String, Slot<V, E>>,
    next_fetch_id: u64,
}

/// Shared, cloneable handle to one client's query cache.
#[derive(Clone)]
pub struct SessionCache<V, E> {
    inner: Arc<Mutex<Inner<V, E>>>,
    events: broadcast::Sender<CacheEvent>,
    default_stale_time: Duration,
}

impl<V, E> SessionCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty cache. `default_stale_time` applies to entries written
    /// by [`SessionCache::set`] before any read configured them.
    #[must_use]
    pub fn new(default_stale_time: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner { entries: HashMap::new(), next_fetch_id: 0 })),
            events,
            default_stale_time,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<V, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Read `key`, fetching it when absent, stale, or errored.
    ///
    /// A fresh value is returned without polling the fetcher's future. If a
    /// fetch for the key is already outstanding, this call awaits that fetch
    /// instead of starting another one. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; it is also recorded on the entry.
    pub async fn read<F, Fut>(&self, key: &str, stale_time: Duration, fetcher: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let future = fetcher();

        let fetch = {
            let mut guard = self.lock();
            let Inner { entries, next_fetch_id } = &mut *guard;
            let slot = entries
                .entry(key.to_owned())
                .or_insert_with(|| Slot::new(stale_time));
            slot.stale_time = stale_time;

            if slot.is_fresh(Instant::now()) {
                if let Some(value) = &slot.value {
                    tracing::trace!(key, "cache hit");
                    return Ok(value.clone());
                }
            }

            match &slot.in_flight {
                Some(flight) if !flight.superseded => {
                    tracing::debug!(key, fetch_id = flight.id, "joining in-flight fetch");
                    flight.fetch.clone()
                }
                current => {
                    let previous = current.as_ref().map(|flight| flight.fetch.clone());
                    *next_fetch_id += 1;
                    let id = *next_fetch_id;
                    let fetch = self.start_fetch(key, id, previous, future);
                    slot.in_flight = Some(InFlight { id, fetch: fetch.clone(), superseded: false });
                    tracing::debug!(key, fetch_id = id, "fetch started");
                    self.emit(CacheEvent::Fetching(key.to_owned()));
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Wrap `future` so it settles its own result, then spawn it.
    ///
    /// With `previous` set, the new request waits for the superseded one to
    /// finish before it is sent.
    fn start_fetch<Fut>(
        &self,
        key: &str,
        id: u64,
        previous: Option<SharedFetch<V, E>>,
        future: Fut,
    ) -> SharedFetch<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let cache = self.clone();
        let key = key.to_owned();
        let fetch = async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let result = future.await;
            cache.settle(&key, id, &result);
            result
        }
        .boxed()
        .shared();
        tokio::spawn(fetch.clone());
        fetch
    }

    /// Record a finished fetch, unless the entry was cleared or the fetch
    /// replaced.
    fn settle(&self, key: &str, id: u64, result: &Result<V, E>) {
        let mut guard = self.lock();
        let Some(slot) = guard.entries.get_mut(key) else {
            tracing::debug!(key, fetch_id = id, "entry cleared during fetch; result dropped");
            return;
        };
        let superseded = match &slot.in_flight {
            Some(flight) if flight.id == id => flight.superseded,
            _ => return,
        };
        slot.in_flight = None;
        if superseded {
            tracing::debug!(key, fetch_id = id, "superseded fetch finished; result dropped");
        } else {
            match result {
                Ok(value) => {
                    slot.value = Some(value.clone());
                    slot.error = None;
                    slot.status = EntryStatus::Success;
                    slot.updated_at = Some(Instant::now());
                    slot.invalidated = false;
                }
                Err(error) => {
                    slot.error = Some(error.clone());
                    slot.status = EntryStatus::Error;
                }
            }
        }
        drop(guard);
        self.emit(CacheEvent::Updated(key.to_owned()));
    }

    /// Snapshot of `key` without fetching.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<CacheEntry<V, E>> {
        let guard = self.lock();
        guard.entries.get(key).map(|slot| slot.snapshot(Instant::now()))
    }

    /// Mark `key` stale while keeping its last value. Returns `false` if absent.
    ///
    /// A fetch already in flight for the key is superseded: its result is
    /// still handed to the readers awaiting it but is not written back, and
    /// the next read queues a fresh request behind it.
    pub fn invalidate(&self, key: &str) -> bool {
        let found = match self.lock().entries.get_mut(key) {
            Some(slot) => {
                slot.invalidated = true;
                if let Some(flight) = &mut slot.in_flight {
                    flight.superseded = true;
                }
                true
            }
            None => false,
        };
        if found {
            tracing::debug!(key, "cache entry invalidated");
            self.emit(CacheEvent::Invalidated(key.to_owned()));
        }
        found
    }

    /// Remove `key`, or every entry when `key` is `None`. Returns how many
    /// entries were dropped.
    pub fn clear(&self, key: Option<&str>) -> usize {
        match key {
            Some(key) => {
                let removed = self.lock().entries.remove(key).is_some();
                if removed {
                    tracing::debug!(key, "cache entry removed");
                    self.emit(CacheEvent::Removed(key.to_owned()));
                }
                usize::from(removed)
            }
            None => {
                let dropped = {
                    let mut guard = self.lock();
                    let count = guard.entries.len();
                    guard.entries.clear();
                    count
                };
                tracing::debug!(dropped, "cache cleared");
                self.emit(CacheEvent::Cleared);
                dropped
            }
        }
    }

    /// Write a value directly, as if a fetch had just succeeded.
    pub fn set(&self, key: &str, value: V) {
        {
            let mut guard = self.lock();
            let slot = guard
                .entries
                .entry(key.to_owned())
                .or_insert_with(|| Slot::new(self.default_stale_time));
            slot.value = Some(value);
            slot.error = None;
            slot.status = EntryStatus::Success;
            slot.updated_at = Some(Instant::now());
            slot.invalidated = false;
        }
        self.emit(CacheEvent::Updated(key.to_owned()));
    }

    /// All cached keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
