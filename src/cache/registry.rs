//! Bidirectional invalidation registry.
//!
//! Declares which cached queries each kind of write makes stale, so the link
//! between a mutation and the list it refreshes is data rather than a string
//! convention shared by two call sites.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

use super::keys::{InvalidationTarget, QueryKey};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

pub const EXAMPLES_KEY: &str = "examples";
pub const EXAMPLE_KEY: &str = "example";
pub const USER_INFO_KEY: &str = "user_info";

/// Names a kind of write, e.g. `createExample`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationKind(String);

impl MutationKind {
    pub const CREATE_EXAMPLE: &'static str = "createExample";
    pub const REPLACE_EXAMPLE: &'static str = "replaceExample";
    pub const DELETE_EXAMPLE: &'static str = "deleteExample";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MutationKind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Tracks mutation → targets and target → mutations mappings.
///
/// The reverse direction answers "which writes refresh this query", which is
/// what a misconfigured refresh-after-write needs to be diagnosed.
pub struct InvalidationRegistry {
    /// Maps mutation kinds to the targets they invalidate
    kind_to_targets: RwLock<HashMap<MutationKind, HashSet<InvalidationTarget>>>,
    /// Maps targets to the mutation kinds that invalidate them
    target_to_kinds: RwLock<HashMap<InvalidationTarget, HashSet<MutationKind>>>,
}

impl InvalidationRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            kind_to_targets: RwLock::new(HashMap::new()),
            target_to_kinds: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the mapping used by the example collection.
    ///
    /// Every write refreshes the sorted list; replace and delete also refresh
    /// any cached single-record reads.
    pub fn examples() -> Self {
        let registry = Self::new();
        registry.register(
            MutationKind::CREATE_EXAMPLE.into(),
            [InvalidationTarget::exact(EXAMPLES_KEY)],
        );
        registry.register(
            MutationKind::REPLACE_EXAMPLE.into(),
            [
                InvalidationTarget::exact(EXAMPLES_KEY),
                InvalidationTarget::prefix(EXAMPLE_KEY),
            ],
        );
        registry.register(
            MutationKind::DELETE_EXAMPLE.into(),
            [
                InvalidationTarget::exact(EXAMPLES_KEY),
                InvalidationTarget::prefix(EXAMPLE_KEY),
            ],
        );
        registry
    }

    /// Declare the targets a mutation kind invalidates, adding to any already
    /// registered.
    pub fn register(
        &self,
        kind: MutationKind,
        targets: impl IntoIterator<Item = InvalidationTarget>,
    ) {
        let mut k2t = rw_write(&self.kind_to_targets, SOURCE, "register.kind_to_targets");
        let mut t2k = rw_write(&self.target_to_kinds, SOURCE, "register.target_to_kinds");

        let entry = k2t.entry(kind.clone()).or_default();
        for target in targets {
            t2k.entry(target.clone()).or_default().insert(kind.clone());
            entry.insert(target);
        }
    }

    /// Targets invalidated by a mutation kind.
    pub fn targets_for(&self, kind: &MutationKind) -> HashSet<InvalidationTarget> {
        rw_read(&self.kind_to_targets, SOURCE, "targets_for")
            .get(kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Mutation kinds whose targets cover `key`.
    pub fn kinds_for_key(&self, key: &QueryKey) -> HashSet<MutationKind> {
        rw_read(&self.target_to_kinds, SOURCE, "kinds_for_key")
            .iter()
            .filter(|(target, _)| target.matches(key))
            .flat_map(|(_, kinds)| kinds.iter().cloned())
            .collect()
    }
}

impl Default for InvalidationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
