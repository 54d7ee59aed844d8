//! JSON request/response exchange with the remote API.
//!
//! The [`Transport`] trait is the seam between typed clients and the network;
//! [`HttpTransport`] is the reqwest-backed implementation. Transports never
//! retry: a retry policy belongs to the caller.

mod base_url;
mod error;
mod http;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

pub use base_url::{BaseUrlSource, context_root, resolve as resolve_base_url};
pub use error::TransportError;
pub use http::HttpTransport;

/// Performs one JSON exchange against a base URL fixed at construction.
///
/// `path` is a list of raw path segments relative to the base URL; the
/// implementation is responsible for encoding them. Empty response bodies
/// decode as [`Value::Null`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &[&str],
        body: Option<Value>,
    ) -> Result<Value, TransportError>;
}
