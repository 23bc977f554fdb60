//! Peer connection state machine
//!
//! A [`RemoteCore`] wraps an endpoint with two-phase, idempotent
//! connect/disconnect and fires registered hooks with the peer namespace on
//! each transition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::endpoint::RemoteEndpoint;
use crate::Result;

type PeerHook = Box<dyn Fn(&str) + Send + Sync>;

/// Connection wrapper around a federation endpoint
pub struct RemoteCore {
    endpoint: Arc<dyn RemoteEndpoint>,
    connected: AtomicBool,
    on_connected: Mutex<Vec<PeerHook>>,
    on_disconnected: Mutex<Vec<PeerHook>>,
}

impl std::fmt::Debug for RemoteCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCore")
            .field("namespace", &self.endpoint.namespace())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl RemoteCore {
    /// Wrap an endpoint; the connection starts unconnected
    #[must_use]
    pub fn new(endpoint: Arc<dyn RemoteEndpoint>) -> Self {
        Self {
            endpoint,
            connected: AtomicBool::new(false),
            on_connected: Mutex::new(Vec::new()),
            on_disconnected: Mutex::new(Vec::new()),
        }
    }

    /// The peer's namespace
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.endpoint.namespace()
    }

    /// The wrapped endpoint
    #[must_use]
    pub fn endpoint(&self) -> &Arc<dyn RemoteEndpoint> {
        &self.endpoint
    }

    /// Whether the handshake has completed
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Register a hook fired with the namespace after connect
    pub fn on_connected(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.on_connected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// Register a hook fired with the namespace after disconnect
    pub fn on_disconnected(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.on_disconnected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// Perform the handshake and fire on-connected hooks.
    ///
    /// No-op when already connected.
    ///
    /// # Errors
    ///
    /// Propagates the endpoint's handshake error; the state stays
    /// unconnected.
    pub async fn connect(&self) -> Result<()> {
        if self.connected.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = self.endpoint.open().await {
            self.connected.store(false, Ordering::Release);
            return Err(e);
        }
        tracing::info!(namespace = self.namespace(), "peer connected");
        self.fire(&self.on_connected);
        Ok(())
    }

    /// Tear down the connection and fire on-disconnected hooks.
    ///
    /// No-op when not connected.
    pub async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        self.endpoint.close().await;
        tracing::info!(namespace = self.namespace(), "peer disconnected");
        self.fire(&self.on_disconnected);
    }

    fn fire(&self, hooks: &Mutex<Vec<PeerHook>>) {
        let namespace = self.namespace().to_string();
        let hooks = hooks.lock().unwrap_or_else(PoisonError::into_inner);
        for hook in &*hooks {
            hook(&namespace);
        }
    }
}
