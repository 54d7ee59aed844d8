//! Query cache events.
//!
//! Entry state changes are announced to explicitly registered listeners. There
//! is no implicit dependency tracking: a consumer that wants to react to a key
//! registers a callback for it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;

use super::keys::QueryKey;

/// Per-key monotonically increasing fetch tag.
pub type Generation = u64;

/// Process-wide event sequence number.
pub type Seq = u64;

/// Callback invoked for every event a listener is registered for.
///
/// Listeners run after the cache lock is released and may call back into the
/// cache.
pub type Listener = Arc<dyn Fn(&QueryEvent) + Send + Sync>;

/// Handle used to detach a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// A state change of one cache entry.
#[derive(Debug, Clone)]
pub struct QueryEvent {
    /// Monotonic sequence for ordering within this process.
    pub seq: Seq,
    pub key: QueryKey,
    /// Generation of the entry when the event was raised.
    pub generation: Generation,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

/// Types of entry state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A fetch for a new generation was issued.
    FetchStarted,
    /// The latest generation's fetch succeeded.
    FetchSucceeded,
    /// The latest generation's fetch failed.
    FetchFailed,
    /// The entry was marked stale.
    Invalidated,
    /// The entry was garbage collected.
    Removed,
}

/// Allocates event sequence numbers and listener ids.
#[derive(Debug, Default)]
pub(crate) struct EventClock {
    seq: AtomicU64,
    listener: AtomicU64,
}

impl EventClock {
    pub(crate) fn event(&self, key: &QueryKey, generation: Generation, kind: EventKind) -> QueryEvent {
        QueryEvent {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            key: key.clone(),
            generation,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub(crate) fn listener_id(&self) -> ListenerId {
        ListenerId(self.listener.fetch_add(1, Ordering::SeqCst))
    }
}

/// Deliver `event` to each listener in registration order.
pub(crate) fn dispatch(listeners: &[Listener], event: &QueryEvent) {
    for listener in listeners {
        listener(event);
    }
}
