//! Query key definitions.
//!
//! A [`QueryKey`] names one cached read. An [`InvalidationTarget`] names the
//! set of keys a write makes stale.

use std::fmt;

/// Identifier of a cached, shareable asynchronous read.
///
/// Keys are ordered segment lists: `"examples"` is one segment,
/// `["example", "Jane"]` is two. Equal segment lists are the same query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new(root: impl Into<String>) -> Self {
        Self(vec![root.into()])
    }

    /// Append one segment.
    #[must_use]
    pub fn with(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True when `prefix` is a leading run of this key's segments.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl From<&str> for QueryKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for QueryKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<const N: usize> From<[&str; N]> for QueryKey {
    fn from(value: [&str; N]) -> Self {
        Self(value.iter().map(|s| (*s).to_string()).collect())
    }
}

/// Which cached queries a write makes stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidationTarget {
    /// Exactly this key.
    Exact(QueryKey),
    /// Every key that starts with these segments.
    Prefix(QueryKey),
    /// Every key in the cache.
    All,
}

impl InvalidationTarget {
    pub fn exact(key: impl Into<QueryKey>) -> Self {
        Self::Exact(key.into())
    }

    pub fn prefix(key: impl Into<QueryKey>) -> Self {
        Self::Prefix(key.into())
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            Self::Exact(target) => target == key,
            Self::Prefix(prefix) => key.starts_with(prefix),
            Self::All => true,
        }
    }
}

impl fmt::Display for InvalidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(key) => write!(f, "{key}"),
            Self::Prefix(key) => write!(f, "{key}/*"),
            Self::All => f.write_str("*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compare_by_segments() {
        assert_eq!(QueryKey::from("examples"), QueryKey::new("examples"));
        assert_eq!(
            QueryKey::from(["example", "Jane"]),
            QueryKey::new("example").with("Jane")
        );
        assert_ne!(QueryKey::from("example"), QueryKey::from(["example", "Jane"]));
    }

    #[test]
    fn display_joins_segments() {
        assert_eq!(QueryKey::from(["example", "Jane"]).to_string(), "example/Jane");
        assert_eq!(
            InvalidationTarget::prefix("example").to_string(),
            "example/*"
        );
    }

    #[test]
    fn exact_target_matches_only_its_key() {
        let target = InvalidationTarget::exact("examples");
        assert!(target.matches(&QueryKey::from("examples")));
        assert!(!target.matches(&QueryKey::from(["examples", "page-2"])));
    }

    #[test]
    fn prefix_target_matches_descendants() {
        let target = InvalidationTarget::prefix("example");
        assert!(target.matches(&QueryKey::from("example")));
        assert!(target.matches(&QueryKey::from(["example", "John"])));
        assert!(!target.matches(&QueryKey::from("examples")));
    }

    #[test]
    fn all_target_matches_everything() {
        assert!(InvalidationTarget::All.matches(&QueryKey::from("user_info")));
    }
}
