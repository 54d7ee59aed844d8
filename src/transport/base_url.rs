//! Base URL resolution.
//!
//! The API lives under the context root of the page that hosts the client:
//! `https://host/app/anything` talks to `https://host/app/api`. A standalone
//! development session (`dev=standalone` in the location while development mode
//! is on) talks to a fixed override instead.

use url::Url;

use super::error::TransportError;

const STANDALONE_MARKER: &str = "dev=standalone";

/// Inputs for resolving the base URL of one API surface.
#[derive(Debug, Clone)]
pub struct BaseUrlSource<'a> {
    pub location: &'a Url,
    pub development: bool,
    pub dev_override: &'a Url,
}

/// Resolve the base URL for the surface mounted at `suffix` (e.g. `/api`).
pub fn resolve(source: &BaseUrlSource<'_>, suffix: &str) -> Result<Url, TransportError> {
    if source.development && source.location.as_str().contains(STANDALONE_MARKER) {
        return Ok(source.dev_override.clone());
    }

    if source.location.cannot_be_a_base() {
        return Err(TransportError::url(format!(
            "location `{}` cannot be used as a base",
            source.location
        )));
    }

    let context_root = context_root(source.location);
    let mut base = source.location.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.set_path(&format!("{context_root}{}", normalize_suffix(suffix)));
    Ok(base)
}

/// First path segment of the location, with a leading slash, or empty.
pub fn context_root(location: &Url) -> String {
    location
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|segment| !segment.is_empty())
        .map(|segment| format!("/{segment}"))
        .unwrap_or_default()
}

fn normalize_suffix(suffix: &str) -> String {
    let trimmed = suffix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
