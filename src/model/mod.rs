//! Live device model: providers, services, resources, attributes
//!
//! The entity tree is the mutable heart of the gateway. Drivers create
//! providers, attach services and resources, and push attribute updates;
//! every observable transition is emitted to the notification engine.

mod attribute;
mod provider;
mod resource;
mod service;
mod value;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use attribute::{Attribute, Constraint, UpdateOutcome, ValuePolicy, WriteOrigin};
pub use provider::Provider;
pub use resource::{ActHandler, Resource, ResourceBuilder, ResourceKind};
pub use service::Service;
pub use value::{TypedValue, ValueType};

/// Name of the administration service seeded on every provider
pub const ADMIN_SERVICE: &str = "admin";

/// Conventional name of a resource's default attribute
pub const DEFAULT_ATTRIBUTE: &str = "value";

/// Lifecycle state of an entity node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    /// Built but not yet visible
    Created,
    /// Visible and emitting notifications
    Started,
    /// Torn down; children destroyed
    Stopped,
}

/// A slash-separated entity path, immutable once created.
///
/// Depth encodes the entity kind: `/provider`, `/provider/service`,
/// `/provider/service/resource`, `/provider/service/resource/attribute`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcePath(String);

impl ResourcePath {
    /// Parse a path, rejecting empty segments and excessive depth.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] on malformed input.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.strip_prefix('/').unwrap_or(raw);
        if trimmed.is_empty() {
            return Err(Error::InvalidPath(raw.to_string()));
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.len() > 4 || segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidPath(raw.to_string()));
        }
        Ok(Self(format!("/{trimmed}")))
    }

    /// Root path for one provider
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if the name is empty or contains `/`.
    pub fn provider_root(name: &str) -> Result<Self> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidPath(name.to_string()));
        }
        Ok(Self(format!("/{name}")))
    }

    /// Append one segment
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if the segment is empty, contains `/`,
    /// or the path is already at attribute depth.
    pub fn join(&self, segment: &str) -> Result<Self> {
        if segment.is_empty() || segment.contains('/') || self.segments().count() >= 4 {
            return Err(Error::InvalidPath(format!("{}/{segment}", self.0)));
        }
        Ok(Self(format!("{}/{segment}", self.0)))
    }

    /// Path segments, outermost first
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Provider segment
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.segments().next()
    }

    /// Service segment
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.segments().nth(1)
    }

    /// Resource segment
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.segments().nth(2)
    }

    /// Attribute segment
    #[must_use]
    pub fn attribute(&self) -> Option<&str> {
        self.segments().nth(3)
    }

    /// String form, always `/`-prefixed
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this path equals or lies under `prefix`
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        self.0 == prefix
            || self
                .0
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl std::fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_all_depths() {
        for raw in ["/p1", "/p1/s1", "/p1/s1/r1", "/p1/s1/r1/value"] {
            assert_eq!(ResourcePath::parse(raw).unwrap().as_str(), raw);
        }
        // Leading slash is optional on input
        assert_eq!(ResourcePath::parse("p1/s1").unwrap().as_str(), "/p1/s1");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(ResourcePath::parse("").is_err());
        assert!(ResourcePath::parse("/").is_err());
        assert!(ResourcePath::parse("/p1//r1").is_err());
        assert!(ResourcePath::parse("/a/b/c/d/e").is_err());
    }

    #[test]
    fn segment_accessors() {
        let path = ResourcePath::parse("/p1/s1/temp/value").unwrap();
        assert_eq!(path.provider(), Some("p1"));
        assert_eq!(path.service(), Some("s1"));
        assert_eq!(path.resource(), Some("temp"));
        assert_eq!(path.attribute(), Some("value"));
    }

    #[test]
    fn prefix_matching_respects_boundaries() {
        let path = ResourcePath::parse("/p1/s1/temp").unwrap();
        assert!(path.starts_with("/p1"));
        assert!(path.starts_with("/p1/s1"));
        assert!(path.starts_with("/"));
        assert!(!path.starts_with("/p1/s"));
        assert!(!path.starts_with("/p2"));
    }

    #[test]
    fn join_caps_depth() {
        let path = ResourcePath::parse("/p1/s1/r1/value").unwrap();
        assert!(path.join("extra").is_err());
    }
}
