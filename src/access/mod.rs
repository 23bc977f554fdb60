//! Access-control resolution
//!
//! The gateway consumes an [`AccessTree`] built by an external security
//! collaborator. The tree is immutable once built; every caller-facing
//! operation resolves a level against it, and sessions snapshot their view
//! through an [`AccessProfile`].

mod tree;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

pub use tree::{AccessNode, AccessTree, AccessTreeBuilder};

/// Access method types a caller can invoke on a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessMethod {
    /// Read a value
    Get,
    /// Write a value
    Set,
    /// Execute an action
    Act,
    /// Register a notification callback
    Subscribe,
    /// Remove a notification callback
    Unsubscribe,
    /// Enumerate / describe the entity
    Describe,
}

impl AccessMethod {
    /// All method types, in a stable order
    pub const ALL: [Self; 6] = [
        Self::Get,
        Self::Set,
        Self::Act,
        Self::Subscribe,
        Self::Unsubscribe,
        Self::Describe,
    ];
}

impl std::fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Set => write!(f, "SET"),
            Self::Act => write!(f, "ACT"),
            Self::Subscribe => write!(f, "SUBSCRIBE"),
            Self::Unsubscribe => write!(f, "UNSUBSCRIBE"),
            Self::Describe => write!(f, "DESCRIBE"),
        }
    }
}

/// Totally ordered access levels
///
/// A caller may act on a path+method only if its resolved level is at least
/// the minimum configured for that path+method.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// No access at all
    #[default]
    Denied,
    /// Unauthenticated caller
    Anonymous,
    /// Authenticated caller
    Authenticated,
    /// Owner of the subtree
    Owner,
    /// Administrative caller
    Admin,
}

/// A caller's resolved view of the access tree, snapshotted per session.
///
/// Resolution results are memoized per path; the underlying tree is immutable
/// so entries never go stale. Also serves as the per-agent accessibility
/// cache in the notification engine.
#[derive(Debug, Clone)]
pub struct AccessProfile {
    tree: Arc<AccessTree>,
    identity: String,
    cache: Arc<RwLock<HashMap<String, HashSet<AccessMethod>>>>,
}

impl AccessProfile {
    /// Snapshot the tree for one caller identity
    #[must_use]
    pub fn new(tree: Arc<AccessTree>, identity: impl Into<String>) -> Self {
        Self {
            tree,
            identity: identity.into(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The caller identity this profile was resolved for
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The tree the profile resolves against
    #[must_use]
    pub fn tree(&self) -> &Arc<AccessTree> {
        &self.tree
    }

    /// Whether the caller may invoke `method` on `path`
    #[must_use]
    pub fn can(&self, path: &str, method: AccessMethod) -> bool {
        self.accessible_methods(path).contains(&method)
    }

    /// The caller's resolved level on `path`
    #[must_use]
    pub fn level(&self, path: &str) -> AccessLevel {
        self.tree.resolve(path, &self.identity)
    }

    /// Set of methods the caller may invoke on `path`, memoized
    #[must_use]
    pub fn accessible_methods(&self, path: &str) -> HashSet<AccessMethod> {
        if let Some(set) = self
            .cache
            .read()
            .ok()
            .and_then(|cache| cache.get(path).cloned())
        {
            return set;
        }
        let set: HashSet<AccessMethod> = AccessMethod::ALL
            .into_iter()
            .filter(|m| self.tree.accessible(path, *m, &self.identity))
            .collect();
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(path.to_string(), set.clone());
        }
        set
    }
}
