//! Query cache.
//!
//! A process-wide, single-flight read cache keyed by [`QueryKey`]:
//!
//! - concurrent subscribers of one key share a single in-flight fetch;
//! - invalidation only marks entries stale, the next access refetches;
//! - each fetch is tagged with a generation and only the latest one may
//!   update the entry;
//! - entries nobody subscribes to are garbage collected after
//!   `cache.gc_interval_seconds`.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! gc_interval_seconds = 300
//! gc_sweep_interval_seconds = 60
//! ```

mod config;
mod entry;
mod error;
mod events;
mod handle;
mod keys;
mod lock;
mod query;
mod registry;

pub use config::QueryCacheConfig;
pub use entry::{QueryData, QueryError, QueryStatus};
pub use error::CacheError;
pub use events::{EventKind, Generation, Listener, ListenerId, QueryEvent, Seq};
pub use handle::{QueryHandle, QuerySnapshot};
pub use keys::{InvalidationTarget, QueryKey};
pub use query::{QueryCache, QueryOptions};
pub use registry::{
    EXAMPLE_KEY, EXAMPLES_KEY, InvalidationRegistry, MutationKind, USER_INFO_KEY,
};

pub(crate) use lock::mutex_lock;
