//! The shared query cache.
//!
//! One [`QueryCache`] owns every entry. Subscribers get a [`QueryHandle`] that
//! reads snapshots; all mutation of entry state happens here, under one mutex,
//! and listeners are invoked only after that mutex is released.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::QueryCacheConfig;
use super::entry::{Fetcher, QueryData, QueryEntry, QueryError, QueryStatus};
use super::error::CacheError;
use super::events::{
    EventClock, EventKind, Generation, Listener, ListenerId, QueryEvent, dispatch,
};
use super::handle::{QueryHandle, QuerySnapshot};
use super::keys::{InvalidationTarget, QueryKey};
use super::lock::mutex_lock;

const SOURCE: &str = "cache::query";

const METRIC_FETCH_TOTAL: &str = "fequery_query_fetch_total";
const METRIC_DEDUP_TOTAL: &str = "fequery_query_dedup_total";
const METRIC_DISCARDED_TOTAL: &str = "fequery_query_discarded_total";
const METRIC_FETCH_MS: &str = "fequery_query_fetch_ms";
const METRIC_ENTRIES: &str = "fequery_query_entries";

const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-subscription options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// A disabled subscription never triggers a fetch; the entry stays idle
    /// until some subscriber enables it.
    pub enabled: bool,
}

impl QueryOptions {
    pub fn enabled(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Shared, single-flight, invalidatable read cache.
///
/// Cloning is cheap and every clone addresses the same entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

struct Inner {
    config: QueryCacheConfig,
    runtime: Handle,
    clock: EventClock,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<QueryKey, QueryEntry>,
    listeners: Vec<(ListenerId, Listener)>,
}

struct FetchJob {
    key: QueryKey,
    generation: Generation,
    fetcher: Fetcher,
}

/// Events raised under the lock, delivered once it is released.
#[derive(Default)]
struct Pending(Vec<(Vec<Listener>, QueryEvent)>);

impl Pending {
    fn push(&mut self, audience: Vec<Listener>, event: QueryEvent) {
        self.0.push((audience, event));
    }

    fn deliver(self) {
        for (audience, event) in self.0 {
            dispatch(&audience, &event);
        }
    }
}

/// Listeners of one entry followed by the cache-wide ones.
fn audience(entry: &QueryEntry, global: &[(ListenerId, Listener)]) -> Vec<Listener> {
    entry
        .listeners
        .iter()
        .chain(global)
        .map(|(_, listener)| Arc::clone(listener))
        .collect()
}

fn erase<T, E, F, Fut>(fetch: F) -> Fetcher
where
    T: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move || {
        let pending = fetch();
        async move {
            pending
                .await
                .map(|data| Arc::new(data) as QueryData)
                .map_err(|err| Arc::new(err) as QueryError)
        }
        .boxed()
    })
}

impl QueryCache {
    /// Create a cache whose fetches are spawned on `runtime`.
    pub fn new(config: QueryCacheConfig, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                runtime,
                clock: EventClock::default(),
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Create a cache bound to the runtime of the calling task.
    pub fn from_current(config: QueryCacheConfig) -> Result<Self, CacheError> {
        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        Ok(Self::new(config, runtime))
    }

    pub fn config(&self) -> &QueryCacheConfig {
        &self.inner.config
    }

    /// Subscribe to `key` with default options.
    pub fn subscribe<T, E, F, Fut>(&self, key: impl Into<QueryKey>, fetch: F) -> QueryHandle<T>
    where
        T: Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.subscribe_with(key, QueryOptions::default(), fetch)
    }

    /// Subscribe to `key`, creating the entry on first use.
    ///
    /// Starts a fetch when the entry is enabled and either has never been
    /// fetched or is stale. Otherwise the subscriber joins whatever state the
    /// entry is in, including an in-flight fetch. The supplied `fetch`
    /// replaces the entry's stored fetch function for later refetches.
    pub fn subscribe_with<T, E, F, Fut>(
        &self,
        key: impl Into<QueryKey>,
        options: QueryOptions,
        fetch: F,
    ) -> QueryHandle<T>
    where
        T: Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = key.into();
        let fetcher = erase(fetch);
        let mut pending = Pending::default();

        let (revision, job) = {
            let mut guard = mutex_lock(&self.inner.state, SOURCE, "subscribe");
            let state = &mut *guard;
            let created = !state.entries.contains_key(&key);

            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(|| QueryEntry::new(Arc::clone(&fetcher), options.enabled));
            entry.fetcher = fetcher;
            entry.subscribers += 1;
            entry.released_at = None;
            entry.enabled |= options.enabled;

            let job = self.start_if_needed(&key, entry, &state.listeners, &mut pending);
            if job.is_none() && entry.status == QueryStatus::Loading && options.enabled {
                counter!(METRIC_DEDUP_TOTAL).increment(1);
                debug!(key = %key, generation = entry.generation, "Joined in-flight query fetch");
            }
            let revision = entry.watch();

            if created {
                gauge!(METRIC_ENTRIES).set(state.entries.len() as f64);
            }
            (revision, job)
        };

        pending.deliver();
        if let Some(job) = job {
            self.spawn_fetch(job);
        }
        QueryHandle::new(self.clone(), key, revision)
    }

    /// Mark `key` stale. Returns the number of entries marked (0 or 1).
    ///
    /// Nothing is fetched here; the next subscription or refetch does.
    pub fn invalidate(&self, key: &QueryKey) -> usize {
        self.invalidate_where(|candidate| candidate == key)
    }

    /// Mark every entry covered by `target` stale.
    pub fn invalidate_matching(&self, target: &InvalidationTarget) -> usize {
        self.invalidate_where(|key| target.matches(key))
    }

    /// Mark every entry whose key satisfies `predicate` stale.
    pub fn invalidate_where(&self, predicate: impl Fn(&QueryKey) -> bool) -> usize {
        let mut pending = Pending::default();
        let marked = {
            let mut guard = mutex_lock(&self.inner.state, SOURCE, "invalidate");
            let state = &mut *guard;
            let mut marked = 0;
            for (key, entry) in state.entries.iter_mut().filter(|(key, _)| predicate(key)) {
                entry.mark_stale();
                pending.push(
                    audience(entry, &state.listeners),
                    self.inner
                        .clock
                        .event(key, entry.generation, EventKind::Invalidated),
                );
                marked += 1;
            }
            marked
        };
        pending.deliver();
        debug!(marked, "Queries invalidated");
        marked
    }

    /// Start a new generation for `key` even if one is already in flight.
    ///
    /// The earlier fetch keeps running but its result will be discarded.
    pub fn refetch(&self, key: &QueryKey) -> Result<Generation, CacheError> {
        let mut pending = Pending::default();
        let job = {
            let mut guard = mutex_lock(&self.inner.state, SOURCE, "refetch");
            let state = &mut *guard;
            let entry = state
                .entries
                .get_mut(key)
                .ok_or_else(|| CacheError::unknown_key(key))?;
            self.start(key, entry, &state.listeners, &mut pending)
        };
        let generation = job.generation;
        pending.deliver();
        self.spawn_fetch(job);
        Ok(generation)
    }

    /// Enable or disable automatic fetching for `key`.
    ///
    /// Enabling an idle or stale entry starts a fetch immediately.
    pub fn set_enabled(&self, key: &QueryKey, enabled: bool) -> Result<(), CacheError> {
        let mut pending = Pending::default();
        let job = {
            let mut guard = mutex_lock(&self.inner.state, SOURCE, "set_enabled");
            let state = &mut *guard;
            let entry = state
                .entries
                .get_mut(key)
                .ok_or_else(|| CacheError::unknown_key(key))?;
            entry.enabled = enabled;
            self.start_if_needed(key, entry, &state.listeners, &mut pending)
        };
        pending.deliver();
        if let Some(job) = job {
            self.spawn_fetch(job);
        }
        Ok(())
    }

    /// Register a listener for every entry's events.
    pub fn listen(&self, listener: impl Fn(&QueryEvent) + Send + Sync + 'static) -> ListenerId {
        let id = self.inner.clock.listener_id();
        mutex_lock(&self.inner.state, SOURCE, "listen")
            .listeners
            .push((id, Arc::new(listener)));
        id
    }

    /// Detach a cache-wide listener. Returns whether it was registered.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut state = mutex_lock(&self.inner.state, SOURCE, "unlisten");
        let before = state.listeners.len();
        state.listeners.retain(|(existing, _)| *existing != id);
        state.listeners.len() != before
    }

    /// Read the current state of `key` without subscribing.
    pub fn peek<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<QuerySnapshot<T>> {
        let state = mutex_lock(&self.inner.state, SOURCE, "peek");
        state
            .entries
            .get(key)
            .map(|entry| QuerySnapshot::from_entry(key, entry))
    }

    pub fn status(&self, key: &QueryKey) -> Option<QueryStatus> {
        let state = mutex_lock(&self.inner.state, SOURCE, "status");
        state.entries.get(key).map(|entry| entry.status)
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> Option<usize> {
        let state = mutex_lock(&self.inner.state, SOURCE, "subscriber_count");
        state.entries.get(key).map(|entry| entry.subscribers)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        mutex_lock(&self.inner.state, SOURCE, "contains")
            .entries
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.inner.state, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove entries nobody has subscribed to for at least `gc_interval`.
    ///
    /// Returns the number of entries removed.
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let gc_interval = self.inner.config.gc_interval;
        let mut pending = Pending::default();
        let removed = {
            let mut guard = mutex_lock(&self.inner.state, SOURCE, "collect_garbage");
            let state = &mut *guard;
            let expired: Vec<QueryKey> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_collectable(now, gc_interval))
                .map(|(key, _)| key.clone())
                .collect();

            let global: Vec<Listener> = state
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            for key in &expired {
                if let Some(entry) = state.entries.remove(key) {
                    pending.push(
                        global.clone(),
                        self.inner
                            .clock
                            .event(key, entry.generation, EventKind::Removed),
                    );
                }
            }
            if !expired.is_empty() {
                gauge!(METRIC_ENTRIES).set(state.entries.len() as f64);
            }
            expired.len()
        };

        pending.deliver();
        if removed > 0 {
            info!(removed, "Query cache garbage collected");
        }
        removed
    }

    /// Run [`collect_garbage`](Self::collect_garbage) every
    /// `gc_sweep_interval` until the last clone of the cache is dropped.
    pub fn spawn_gc_sweeper(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self
            .inner
            .config
            .gc_sweep_interval
            .clamp(MIN_SWEEP_PERIOD, MAX_SWEEP_PERIOD);

        self.inner.runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("Query cache dropped, stopping garbage collection");
                    break;
                };
                QueryCache { inner }.collect_garbage();
            }
        })
    }

    pub(crate) fn attach(&self, key: &QueryKey, listener: Listener) -> ListenerId {
        let id = self.inner.clock.listener_id();
        let mut state = mutex_lock(&self.inner.state, SOURCE, "attach");
        if let Some(entry) = state.entries.get_mut(key) {
            entry.listeners.push((id, listener));
        }
        id
    }

    pub(crate) fn detach(&self, key: &QueryKey, id: ListenerId) -> bool {
        let mut state = mutex_lock(&self.inner.state, SOURCE, "detach");
        let Some(entry) = state.entries.get_mut(key) else {
            return false;
        };
        let before = entry.listeners.len();
        entry.listeners.retain(|(existing, _)| *existing != id);
        entry.listeners.len() != before
    }

    /// Drop one subscription and the listeners it registered.
    pub(crate) fn release(&self, key: &QueryKey, listeners: &[ListenerId]) {
        let mut state = mutex_lock(&self.inner.state, SOURCE, "release");
        if let Some(entry) = state.entries.get_mut(key) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
            entry.listeners.retain(|(id, _)| !listeners.contains(id));
            if entry.subscribers == 0 {
                entry.released_at = Some(Instant::now());
            }
        }
    }

    fn start_if_needed(
        &self,
        key: &QueryKey,
        entry: &mut QueryEntry,
        global: &[(ListenerId, Listener)],
        pending: &mut Pending,
    ) -> Option<FetchJob> {
        entry
            .needs_fetch()
            .then(|| self.start(key, entry, global, pending))
    }

    fn start(
        &self,
        key: &QueryKey,
        entry: &mut QueryEntry,
        global: &[(ListenerId, Listener)],
        pending: &mut Pending,
    ) -> FetchJob {
        let generation = entry.begin_fetch();
        counter!(METRIC_FETCH_TOTAL).increment(1);
        debug!(key = %key, generation, "Query fetch started");
        pending.push(
            audience(entry, global),
            self.inner
                .clock
                .event(key, generation, EventKind::FetchStarted),
        );
        FetchJob {
            key: key.clone(),
            generation,
            fetcher: Arc::clone(&entry.fetcher),
        }
    }

    fn spawn_fetch(&self, job: FetchJob) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.runtime.spawn(async move {
            let FetchJob {
                key,
                generation,
                fetcher,
            } = job;
            let started = Instant::now();
            let result = AssertUnwindSafe(async move { fetcher().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(Arc::new(CacheError::FetchPanicked { key: key.clone() }) as QueryError)
                });
            histogram!(METRIC_FETCH_MS).record(started.elapsed().as_secs_f64() * 1000.0);

            match weak.upgrade() {
                Some(inner) => QueryCache { inner }.complete(&key, generation, result),
                None => debug!(key = %key, generation, "Query cache dropped before fetch completed"),
            }
        });
    }

    /// Apply a finished fetch if it still belongs to the entry's current
    /// generation.
    fn complete(
        &self,
        key: &QueryKey,
        generation: Generation,
        result: Result<QueryData, QueryError>,
    ) {
        let mut pending = Pending::default();
        {
            let mut guard = mutex_lock(&self.inner.state, SOURCE, "complete");
            let state = &mut *guard;
            let Some(entry) = state.entries.get_mut(key) else {
                counter!(METRIC_DISCARDED_TOTAL).increment(1);
                debug!(key = %key, generation, "Discarding fetch result for a removed query");
                return;
            };
            if entry.generation != generation {
                counter!(METRIC_DISCARDED_TOTAL).increment(1);
                debug!(
                    key = %key,
                    generation,
                    current = entry.generation,
                    "Discarding superseded fetch result"
                );
                return;
            }

            let kind = entry.apply(result);
            match (&kind, entry.error.as_ref()) {
                (EventKind::FetchFailed, Some(error)) => {
                    warn!(key = %key, generation, error = %error, "Query fetch failed");
                }
                _ => debug!(key = %key, generation, "Query fetch succeeded"),
            }
            pending.push(
                audience(entry, &state.listeners),
                self.inner.clock.event(key, generation, kind),
            );
        }
        pending.deliver();
    }
}
