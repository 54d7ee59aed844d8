use thiserror::Error;

/// Failure reported by a [`Transport`](super::Transport).
///
/// Errors are cloneable so a failed fetch can be shared by every subscriber of
/// a cached query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("no response received: {message}")]
    Network { message: String },
    #[error("failed to decode response body: {message}")]
    Decode { message: String },
    #[error("invalid request url: {message}")]
    Url { message: String },
}

impl TransportError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn url(message: impl Into<String>) -> Self {
        Self::Url {
            message: message.into(),
        }
    }

    /// HTTP status code, when a response was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.status_code() == Some(409)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::status(status.as_u16(), err.to_string()),
            None => Self::network(err.to_string()),
        }
    }
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        Self::url(err.to_string())
    }
}
