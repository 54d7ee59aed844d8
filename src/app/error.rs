use thiserror::Error;

use crate::cache::{CacheError, QueryError, QueryKey};
use crate::config::LoadError;
use crate::infra::InfraError;
use crate::resource::ClientError;
use crate::transport::TransportError;

/// Errors surfaced at the binary edge.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("query `{key}` failed: {source}")]
    Query {
        key: QueryKey,
        #[source]
        source: QueryError,
    },
    #[error("query `{key}` settled without data")]
    NoData { key: QueryKey },
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl AppError {
    pub fn query(key: &QueryKey, source: QueryError) -> Self {
        Self::Query {
            key: key.clone(),
            source,
        }
    }

    /// HTTP status behind this error, if a server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Transport(err) => err.status_code(),
            Self::Client(err) => err.status_code(),
            Self::Query { source, .. } => source
                .downcast_ref::<ClientError>()
                .and_then(ClientError::status_code),
            _ => None,
        }
    }
}
