//! Read handles handed out by [`QueryCache::subscribe`].

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use tokio::sync::watch;

use super::entry::{QueryEntry, QueryError, QueryStatus};
use super::error::CacheError;
use super::events::{Generation, ListenerId, QueryEvent};
use super::keys::QueryKey;
use super::lock::mutex_lock;
use super::query::QueryCache;

const SOURCE: &str = "cache::handle";

/// Point-in-time view of one entry.
pub struct QuerySnapshot<T> {
    pub status: QueryStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<QueryError>,
    pub fetched_at: Option<OffsetDateTime>,
    pub stale: bool,
    pub generation: Generation,
}

impl<T: Send + Sync + 'static> QuerySnapshot<T> {
    pub(crate) fn from_entry(key: &QueryKey, entry: &QueryEntry) -> Self {
        let mut snapshot = Self {
            status: entry.status,
            data: None,
            error: entry.error.clone(),
            fetched_at: entry.fetched_at,
            stale: entry.stale,
            generation: entry.generation,
        };
        if let Some(data) = entry.data.clone() {
            match data.downcast::<T>() {
                Ok(data) => snapshot.data = Some(data),
                Err(_) => {
                    snapshot.status = QueryStatus::Error;
                    snapshot.error = Some(Arc::new(CacheError::type_mismatch(key)));
                }
            }
        }
        snapshot
    }
}

impl<T> QuerySnapshot<T> {
    fn vanished() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            fetched_at: None,
            stale: false,
            generation: 0,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    /// The error for an `error` snapshot, the data (if any) otherwise.
    pub fn into_result(self) -> Result<Option<Arc<T>>, QueryError> {
        match (self.status, self.error) {
            (QueryStatus::Error, Some(error)) => Err(error),
            _ => Ok(self.data),
        }
    }
}

impl<T> Clone for QuerySnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            stale: self.stale,
            generation: self.generation,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for QuerySnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySnapshot")
            .field("status", &self.status)
            .field("data", &self.data)
            .field("error", &self.error.as_ref().map(ToString::to_string))
            .field("fetched_at", &self.fetched_at)
            .field("stale", &self.stale)
            .field("generation", &self.generation)
            .finish()
    }
}

/// A subscription to one cache entry.
///
/// Dropping the handle unsubscribes and detaches every listener registered
/// through it. The entry itself stays until garbage collected.
pub struct QueryHandle<T> {
    cache: QueryCache,
    key: QueryKey,
    revision: watch::Receiver<u64>,
    listeners: Mutex<Vec<ListenerId>>,
    _data: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> QueryHandle<T> {
    pub(crate) fn new(cache: QueryCache, key: QueryKey, revision: watch::Receiver<u64>) -> Self {
        Self {
            cache,
            key,
            revision,
            listeners: Mutex::new(Vec::new()),
            _data: PhantomData,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn snapshot(&self) -> QuerySnapshot<T> {
        self.cache
            .peek(&self.key)
            .unwrap_or_else(QuerySnapshot::vanished)
    }

    /// Wait until the entry is not loading and return its state.
    ///
    /// An idle (disabled) entry is returned immediately.
    pub async fn settled(&self) -> QuerySnapshot<T> {
        let mut revision = self.revision.clone();
        loop {
            revision.borrow_and_update();
            let snapshot = self.snapshot();
            if !snapshot.is_loading() {
                return snapshot;
            }
            if revision.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }

    /// Enable automatic fetching, starting a fetch if the entry needs one.
    pub fn enable(&self) -> Result<(), CacheError> {
        self.cache.set_enabled(&self.key, true)
    }

    pub fn refetch(&self) -> Result<Generation, CacheError> {
        self.cache.refetch(&self.key)
    }

    /// Call `listener` for every event on this key while the handle lives.
    pub fn on_change(&self, listener: impl Fn(&QueryEvent) + Send + Sync + 'static) -> ListenerId {
        let id = self.cache.attach(&self.key, Arc::new(listener));
        mutex_lock(&self.listeners, SOURCE, "on_change").push(id);
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        mutex_lock(&self.listeners, SOURCE, "remove_listener").retain(|existing| *existing != id);
        self.cache.detach(&self.key, id)
    }
}

impl<T> Drop for QueryHandle<T> {
    fn drop(&mut self) {
        let listeners = match self.listeners.get_mut() {
            Ok(listeners) => std::mem::take(listeners),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        self.cache.release(&self.key, &listeners);
    }
}

impl<T> fmt::Debug for QueryHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
