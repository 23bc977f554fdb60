//! Caller sessions
//!
//! A session wraps an opaque token, a caller identity and a resolved access
//! snapshot, and tracks the callbacks and agents it owns. Teardown is
//! explicit: the owning connection handler closes the session, and the
//! gateway cascades cleanup of everything it owned.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use uuid::Uuid;

use crate::access::{AccessProfile, AccessTree};
use crate::{Error, Result};

/// An authenticated caller handle
pub struct Session {
    token: String,
    profile: AccessProfile,
    callbacks: Mutex<HashSet<String>>,
    agents: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token)
            .field("identity", &self.profile.identity())
            .finish_non_exhaustive()
    }
}

impl Session {
    fn new(tree: Arc<AccessTree>, identity: &str) -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            profile: AccessProfile::new(tree, identity),
            callbacks: Mutex::new(HashSet::new()),
            agents: Mutex::new(HashSet::new()),
        }
    }

    /// Opaque session token
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Caller identity the session was opened for
    #[must_use]
    pub fn identity(&self) -> &str {
        self.profile.identity()
    }

    /// The session's resolved access snapshot
    #[must_use]
    pub const fn profile(&self) -> &AccessProfile {
        &self.profile
    }

    /// Record ownership of a callback
    pub fn track_callback(&self, id: impl Into<String>) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into());
    }

    /// Drop ownership of a callback
    pub fn untrack_callback(&self, id: &str) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Record ownership of an agent
    pub fn track_agent(&self, id: impl Into<String>) {
        self.agents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into());
    }

    /// Drop ownership of an agent
    pub fn untrack_agent(&self, id: &str) {
        self.agents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Snapshot of owned callback ids
    #[must_use]
    pub fn owned_callbacks(&self) -> Vec<String> {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Snapshot of owned agent ids
    #[must_use]
    pub fn owned_agents(&self) -> Vec<String> {
        self.agents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Token-keyed session directory
#[derive(Debug)]
pub struct SessionManager {
    tree: Arc<AccessTree>,
    sessions: RwLock<std::collections::HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    /// Create a manager resolving sessions against `tree`
    #[must_use]
    pub fn new(tree: Arc<AccessTree>) -> Self {
        Self {
            tree,
            sessions: RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// Open a session for a caller identity
    pub fn open(&self, identity: &str) -> Arc<Session> {
        let session = Arc::new(Session::new(Arc::clone(&self.tree), identity));
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.token().to_string(), Arc::clone(&session));
        tracing::debug!(identity, token = session.token(), "session opened");
        session
    }

    /// Resolve a token to its live session.
    ///
    /// # Errors
    ///
    /// [`Error::SessionClosed`] for unknown or closed tokens.
    pub fn get(&self, token: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
            .ok_or(Error::SessionClosed)
    }

    /// Remove a session from the directory, returning it for cascade
    /// cleanup. Unknown tokens return `None` (teardown is idempotent).
    pub fn remove(&self, token: &str) -> Option<Arc<Session>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
    }

    /// Tokens of all open sessions
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessLevel, AccessTreeBuilder};

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(
            AccessTreeBuilder::new()
                .default_level("/", AccessLevel::Anonymous)
                .build(),
        ))
    }

    #[test]
    fn open_get_remove_round_trip() {
        let mgr = manager();
        let session = mgr.open("alice");
        let fetched = mgr.get(session.token()).unwrap();
        assert_eq!(fetched.identity(), "alice");

        assert!(mgr.remove(session.token()).is_some());
        assert!(matches!(mgr.get(session.token()), Err(Error::SessionClosed)));
        // Removing again is a no-op
        assert!(mgr.remove(session.token()).is_none());
    }

    #[test]
    fn sessions_track_owned_handles() {
        let mgr = manager();
        let session = mgr.open("alice");
        session.track_callback("cb-1");
        session.track_agent("agent-1");
        assert_eq!(session.owned_callbacks(), vec!["cb-1".to_string()]);
        assert_eq!(session.owned_agents(), vec!["agent-1".to_string()]);
        session.untrack_callback("cb-1");
        assert!(session.owned_callbacks().is_empty());
    }
}
