use thiserror::Error;

use super::keys::QueryKey;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("no Tokio runtime is available to drive query fetches")]
    NoRuntime,
    #[error("no cached query for key `{key}`")]
    UnknownKey { key: QueryKey },
    #[error("cached data for `{key}` has a different type than requested")]
    TypeMismatch { key: QueryKey },
    #[error("fetch for `{key}` panicked")]
    FetchPanicked { key: QueryKey },
}

impl CacheError {
    pub fn unknown_key(key: &QueryKey) -> Self {
        Self::UnknownKey { key: key.clone() }
    }

    pub fn type_mismatch(key: &QueryKey) -> Self {
        Self::TypeMismatch { key: key.clone() }
    }
}
