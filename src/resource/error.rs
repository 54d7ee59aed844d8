use thiserror::Error;

use crate::domain::ValidationError;
use crate::transport::TransportError;

/// Errors surfaced by the typed clients.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("an example named `{name}` already exists")]
    Conflict {
        name: String,
        #[source]
        source: TransportError,
    },
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("failed to encode request body: {message}")]
    Encode { message: String },
}

impl ClientError {
    /// HTTP status behind this error, if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Transport(err) | Self::Conflict { source: err, .. } => err.status_code(),
            Self::Validation(_) | Self::Encode { .. } => None,
        }
    }
}
