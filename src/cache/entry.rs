//! Per-key cache entry and its state machine.
//!
//! `idle -> loading -> {success, error}`; `success|error -> loading` on
//! invalidate-then-access or explicit refetch. An entry leaves `loading` only
//! when the fetch tagged with its current generation completes.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use time::OffsetDateTime;
use tokio::sync::watch;

use super::events::{EventKind, Generation, Listener, ListenerId};

/// Type-erased cached value.
pub type QueryData = Arc<dyn Any + Send + Sync>;

/// Type-erased fetch failure, shared by every subscriber of the key.
pub type QueryError = Arc<dyn std::error::Error + Send + Sync>;

pub(crate) type Fetcher =
    Arc<dyn Fn() -> BoxFuture<'static, Result<QueryData, QueryError>> + Send + Sync>;

/// Fetch status of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Created but never fetched (disabled subscriptions stay here).
    Idle,
    Loading,
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

pub(crate) struct QueryEntry {
    pub(crate) status: QueryStatus,
    pub(crate) data: Option<QueryData>,
    pub(crate) error: Option<QueryError>,
    pub(crate) generation: Generation,
    pub(crate) stale: bool,
    pub(crate) enabled: bool,
    pub(crate) subscribers: usize,
    pub(crate) fetched_at: Option<OffsetDateTime>,
    pub(crate) released_at: Option<Instant>,
    pub(crate) fetcher: Fetcher,
    pub(crate) listeners: Vec<(ListenerId, Listener)>,
    revision: watch::Sender<u64>,
}

impl QueryEntry {
    pub(crate) fn new(fetcher: Fetcher, enabled: bool) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            generation: 0,
            stale: false,
            enabled,
            subscribers: 0,
            fetched_at: None,
            released_at: None,
            fetcher,
            listeners: Vec::new(),
            revision,
        }
    }

    /// Whether the next access must issue a fetch.
    ///
    /// A loading entry is joined unless it was invalidated after its fetch was
    /// issued, in which case a newer generation supersedes it.
    pub(crate) fn needs_fetch(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.status {
            QueryStatus::Idle => true,
            QueryStatus::Loading | QueryStatus::Success | QueryStatus::Error => self.stale,
        }
    }

    /// Move to `loading` under a fresh generation.
    pub(crate) fn begin_fetch(&mut self) -> Generation {
        self.generation += 1;
        self.status = QueryStatus::Loading;
        self.stale = false;
        self.bump_revision();
        self.generation
    }

    /// Apply the result of the current generation's fetch.
    ///
    /// Data from an earlier success is kept alongside a new error.
    pub(crate) fn apply(&mut self, result: Result<QueryData, QueryError>) -> EventKind {
        self.fetched_at = Some(OffsetDateTime::now_utc());
        let kind = match result {
            Ok(data) => {
                self.status = QueryStatus::Success;
                self.data = Some(data);
                self.error = None;
                EventKind::FetchSucceeded
            }
            Err(error) => {
                self.status = QueryStatus::Error;
                self.error = Some(error);
                EventKind::FetchFailed
            }
        };
        self.bump_revision();
        kind
    }

    pub(crate) fn mark_stale(&mut self) {
        self.stale = true;
        self.bump_revision();
    }

    pub(crate) fn watch(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub(crate) fn is_collectable(&self, now: Instant, gc_interval: Duration) -> bool {
        self.subscribers == 0
            && self
                .released_at
                .is_some_and(|released| now.saturating_duration_since(released) >= gc_interval)
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }
}
