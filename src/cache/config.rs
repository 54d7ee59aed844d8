//! Query cache configuration.
//!
//! Built from the `[cache]` section of the settings; see
//! [`CacheSettings`](crate::config::CacheSettings).

use std::time::Duration;

use crate::config::{CacheSettings, DEFAULT_GC_INTERVAL_SECS, DEFAULT_GC_SWEEP_INTERVAL_SECS};

/// Garbage-collection timing for the query cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCacheConfig {
    /// How long an entry with no subscribers is kept before it may be removed.
    pub gc_interval: Duration,
    /// Cadence of the background garbage-collection sweep.
    pub gc_sweep_interval: Duration,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            gc_interval: Duration::from_secs(DEFAULT_GC_INTERVAL_SECS),
            gc_sweep_interval: Duration::from_secs(DEFAULT_GC_SWEEP_INTERVAL_SECS),
        }
    }
}

impl From<&CacheSettings> for QueryCacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            gc_interval: settings.gc_interval,
            gc_sweep_interval: settings.gc_sweep_interval,
        }
    }
}
