//! Cross-gateway federation
//!
//! A federation peer is another gateway instance identified by a unique
//! namespace. Provider ids crossing instance boundaries are qualified as
//! `namespace:providerId`; calls on qualified ids are routed to the peer
//! registered under that namespace, and agent registrations are mirrored so
//! notifications flow back to the originating instance.

mod endpoint;
mod loopback;
mod remote;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub use endpoint::RemoteEndpoint;
pub use loopback::LoopbackEndpoint;
pub use remote::RemoteCore;

use crate::{Error, Result};

/// Split a possibly namespace-qualified provider id.
///
/// `"north:p1"` → `(Some("north"), "p1")`; `"p1"` → `(None, "p1")`.
#[must_use]
pub fn split_qualified(provider_id: &str) -> (Option<&str>, &str) {
    provider_id
        .split_once(':')
        .map_or((None, provider_id), |(ns, id)| (Some(ns), id))
}

/// Qualify a provider id with a namespace
#[must_use]
pub fn qualify(namespace: &str, provider_id: &str) -> String {
    format!("{namespace}:{provider_id}")
}

/// Namespace-keyed directory of peer connections
#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<String, Arc<RemoteCore>>>,
}

impl std::fmt::Debug for PeerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerRegistry").finish_non_exhaustive()
    }
}

impl PeerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer under its namespace.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRegistered`] when the namespace is taken.
    pub fn attach(&self, core: Arc<RemoteCore>) -> Result<()> {
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        let namespace = core.namespace().to_string();
        if peers.contains_key(&namespace) {
            return Err(Error::AlreadyRegistered(namespace));
        }
        peers.insert(namespace, core);
        Ok(())
    }

    /// Remove a peer. Idempotent: unknown namespaces return `None`.
    pub fn detach(&self, namespace: &str) -> Option<Arc<RemoteCore>> {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(namespace)
    }

    /// Resolve the peer registered under `namespace`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownNamespace`] when no peer is registered.
    pub fn get(&self, namespace: &str) -> Result<Arc<RemoteCore>> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .cloned()
            .ok_or_else(|| Error::UnknownNamespace(namespace.to_string()))
    }

    /// All registered peers
    #[must_use]
    pub fn all(&self) -> Vec<Arc<RemoteCore>> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Peers that completed their handshake
    #[must_use]
    pub fn connected(&self) -> Vec<Arc<RemoteCore>> {
        self.all()
            .into_iter()
            .filter(|c| c.is_connected())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualification_round_trip() {
        assert_eq!(split_qualified("north:p1"), (Some("north"), "p1"));
        assert_eq!(split_qualified("p1"), (None, "p1"));
        assert_eq!(qualify("north", "p1"), "north:p1");
        // Only the first colon separates the namespace
        assert_eq!(split_qualified("north:p:1"), (Some("north"), "p:1"));
    }
}
