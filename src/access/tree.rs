//! Path-indexed access tree
//!
//! Nodes are keyed by path prefix. Unresolved paths inherit the nearest
//! ancestor; the root node is the universal fallback. The tree is built once
//! by the security collaborator and is read-only afterwards.

use std::collections::HashMap;

use super::{AccessLevel, AccessMethod};

/// Per-caller grant on one node: a uniform level, optionally overridden per
/// method.
#[derive(Debug, Clone, Default)]
struct Grant {
    uniform: Option<AccessLevel>,
    per_method: HashMap<AccessMethod, AccessLevel>,
}

/// One node of the access tree, keyed by path prefix
#[derive(Debug, Clone, Default)]
pub struct AccessNode {
    /// Minimum level required per method on this subtree
    minima: HashMap<AccessMethod, AccessLevel>,
    /// Explicit per-caller grants
    grants: HashMap<String, Grant>,
    /// Level handed to callers with no explicit grant
    default_level: Option<AccessLevel>,
}

/// Immutable, path-indexed access tree
#[derive(Debug, Default)]
pub struct AccessTree {
    nodes: HashMap<String, AccessNode>,
    owner: Option<String>,
}

/// Built-in minimum when no node on the path configures one.
///
/// Read-style methods are public, mutating methods require authentication.
const fn builtin_minimum(method: AccessMethod) -> AccessLevel {
    match method {
        AccessMethod::Get
        | AccessMethod::Subscribe
        | AccessMethod::Unsubscribe
        | AccessMethod::Describe => AccessLevel::Anonymous,
        AccessMethod::Set | AccessMethod::Act => AccessLevel::Authenticated,
    }
}

/// Iterate a path and its ancestors, most specific first, ending at `"/"`.
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.trim_end_matches('/');
    let mut current = if trimmed.is_empty() { "/" } else { trimmed };
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let out = current;
        if out == "/" {
            done = true;
        } else {
            current = match out.rfind('/') {
                Some(0) | None => "/",
                Some(idx) => &out[..idx],
            };
        }
        Some(out)
    })
}

impl AccessTree {
    /// Resolve the caller's level on `path`.
    ///
    /// Walks from the exact path upward, returning the first explicit grant
    /// found; falls back to the nearest configured default level, and
    /// ultimately to owner-only.
    #[must_use]
    pub fn resolve(&self, path: &str, caller: &str) -> AccessLevel {
        self.resolve_method(path, None, caller)
    }

    /// Resolve the caller's level on `path` for a specific method.
    ///
    /// A grant that carries a per-method override for `method` wins over a
    /// uniform grant on the same node.
    #[must_use]
    pub fn resolve_for(&self, path: &str, method: AccessMethod, caller: &str) -> AccessLevel {
        self.resolve_method(path, Some(method), caller)
    }

    fn resolve_method(
        &self,
        path: &str,
        method: Option<AccessMethod>,
        caller: &str,
    ) -> AccessLevel {
        for prefix in ancestors(path) {
            if let Some(grant) = self.nodes.get(prefix).and_then(|n| n.grants.get(caller)) {
                let level = method
                    .and_then(|m| grant.per_method.get(&m).copied())
                    .or(grant.uniform);
                if let Some(level) = level {
                    return level;
                }
            }
        }
        for prefix in ancestors(path) {
            if let Some(level) = self.nodes.get(prefix).and_then(|n| n.default_level) {
                return level;
            }
        }
        // Owner-only fallback
        if self.owner.as_deref() == Some(caller) {
            AccessLevel::Owner
        } else {
            AccessLevel::Denied
        }
    }

    /// Minimum level required to invoke `method` on `path`.
    ///
    /// The nearest ancestor that configures a minimum for the method wins;
    /// otherwise the built-in default applies.
    #[must_use]
    pub fn minimum(&self, path: &str, method: AccessMethod) -> AccessLevel {
        for prefix in ancestors(path) {
            if let Some(level) = self
                .nodes
                .get(prefix)
                .and_then(|n| n.minima.get(&method).copied())
            {
                return level;
            }
        }
        builtin_minimum(method)
    }

    /// Whether `caller` may invoke `method` on `path`
    #[must_use]
    pub fn accessible(&self, path: &str, method: AccessMethod, caller: &str) -> bool {
        self.resolve_for(path, method, caller) >= self.minimum(path, method)
    }
}

/// Construction-time API for the access tree.
///
/// Only the collaborator that builds the tree mutates it; the gateway core
/// consumes the built tree as an opaque, queryable structure.
#[derive(Debug, Default)]
pub struct AccessTreeBuilder {
    tree: AccessTree,
}

impl AccessTreeBuilder {
    /// Start an empty tree
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the subtree owner used by the owner-only fallback
    #[must_use]
    pub fn owner(mut self, identity: impl Into<String>) -> Self {
        self.tree.owner = Some(identity.into());
        self
    }

    /// Set the default level handed to ungranted callers below `path`
    #[must_use]
    pub fn default_level(mut self, path: &str, level: AccessLevel) -> Self {
        self.node_mut(path).default_level = Some(level);
        self
    }

    /// Set the minimum level required for `method` below `path`
    #[must_use]
    pub fn minimum(mut self, path: &str, method: AccessMethod, level: AccessLevel) -> Self {
        self.node_mut(path).minima.insert(method, level);
        self
    }

    /// Grant `caller` a uniform level below `path`
    #[must_use]
    pub fn grant(mut self, path: &str, caller: impl Into<String>, level: AccessLevel) -> Self {
        self.node_mut(path)
            .grants
            .entry(caller.into())
            .or_default()
            .uniform = Some(level);
        self
    }

    /// Grant `caller` a level for one specific method below `path`
    #[must_use]
    pub fn grant_method(
        mut self,
        path: &str,
        caller: impl Into<String>,
        method: AccessMethod,
        level: AccessLevel,
    ) -> Self {
        self.node_mut(path)
            .grants
            .entry(caller.into())
            .or_default()
            .per_method
            .insert(method, level);
        self
    }

    /// Finish construction; the tree is immutable from here on
    #[must_use]
    pub fn build(self) -> AccessTree {
        self.tree
    }

    fn node_mut(&mut self, path: &str) -> &mut AccessNode {
        let key = if path.is_empty() { "/" } else { path };
        self.tree.nodes.entry(key.to_string()).or_default()
    }
}
