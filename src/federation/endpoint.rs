//! The transport seam between federated gateway instances
//!
//! Wire bindings implement [`RemoteEndpoint`]; the core only ever talks to
//! this trait. Calls may block on network I/O with no timeout of their own;
//! timeout policy belongs to the implementation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::gateway::{AccessResponse, ResourceAddress, SubscriptionRequest};
use crate::notify::{MessageFilter, NotificationSink};

/// A connection to one federated gateway instance
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// The peer's unique namespace
    fn namespace(&self) -> &str;

    /// Perform the connection handshake.
    ///
    /// # Errors
    ///
    /// Transport errors abort the connect; the peer stays unregistered.
    async fn open(&self) -> Result<()>;

    /// Tear the connection down. Must be idempotent.
    async fn close(&self);

    /// Read a resource value on the peer.
    ///
    /// # Errors
    ///
    /// Transport failures; application-level failures travel inside the
    /// returned response.
    async fn get(&self, identity: &str, address: &ResourceAddress) -> Result<AccessResponse>;

    /// Write a resource value on the peer.
    ///
    /// # Errors
    ///
    /// Transport failures; application-level failures travel inside the
    /// returned response.
    async fn set(
        &self,
        identity: &str,
        address: &ResourceAddress,
        value: Value,
    ) -> Result<AccessResponse>;

    /// Execute an action resource on the peer.
    ///
    /// # Errors
    ///
    /// Transport failures; application-level failures travel inside the
    /// returned response.
    async fn act(
        &self,
        identity: &str,
        address: &ResourceAddress,
        parameters: Vec<Value>,
    ) -> Result<AccessResponse>;

    /// Create a subscription on the peer, delivering into `sink`.
    ///
    /// # Errors
    ///
    /// Transport failures; application-level failures travel inside the
    /// returned response.
    async fn subscribe(
        &self,
        identity: &str,
        address: &ResourceAddress,
        sink: Arc<dyn NotificationSink>,
        request: SubscriptionRequest,
    ) -> Result<AccessResponse>;

    /// Remove a subscription on the peer.
    ///
    /// # Errors
    ///
    /// Transport failures; application-level failures travel inside the
    /// returned response.
    async fn unsubscribe(
        &self,
        identity: &str,
        address: &ResourceAddress,
        subscription: &str,
    ) -> Result<AccessResponse>;

    /// Provider ids visible to `identity` on the peer, unqualified.
    ///
    /// # Errors
    ///
    /// Transport failures.
    async fn providers(&self, identity: &str) -> Result<Vec<String>>;

    /// Mirror a local agent onto the peer under its opaque id.
    ///
    /// # Errors
    ///
    /// Transport failures.
    async fn register_agent(
        &self,
        identity: &str,
        agent_id: &str,
        filter: Option<MessageFilter>,
    ) -> Result<()>;

    /// Remove a mirrored agent. Unknown ids are a no-op.
    ///
    /// # Errors
    ///
    /// Transport failures.
    async fn unregister_agent(&self, agent_id: &str) -> Result<()>;
}
