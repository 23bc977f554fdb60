//! In-process federation endpoint
//!
//! Connects two gateway instances living in the same process by direct
//! calls. Used by tests and by the daemon's simulate mode; wire transports
//! implement [`RemoteEndpoint`](super::RemoteEndpoint) the same way against
//! their own plumbing.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;

use super::endpoint::RemoteEndpoint;
use crate::Result;
use crate::gateway::{AccessResponse, Gateway, ResourceAddress, SubscriptionRequest};
use crate::notify::{GatewayMessage, MessageFilter, NotificationSink};

/// Qualifies message paths with the origin namespace before forwarding
struct QualifyingSink {
    inner: Arc<dyn NotificationSink>,
    namespace: String,
}

#[async_trait]
impl NotificationSink for QualifyingSink {
    async fn deliver(&self, messages: Vec<GatewayMessage>) -> Result<()> {
        let qualified = messages
            .into_iter()
            .map(|m| m.qualified(&self.namespace))
            .collect();
        self.inner.deliver(qualified).await
    }
}

/// Relays messages accepted by a mirrored agent back to its home instance
struct RelaySink {
    origin: Weak<Gateway>,
    agent_id: String,
    namespace: String,
}

#[async_trait]
impl NotificationSink for RelaySink {
    async fn deliver(&self, messages: Vec<GatewayMessage>) -> Result<()> {
        let Some(origin) = self.origin.upgrade() else {
            return Ok(());
        };
        let qualified = messages
            .into_iter()
            .map(|m| m.qualified(&self.namespace))
            .collect();
        origin.deliver_to_agent(&self.agent_id, qualified).await;
        Ok(())
    }
}

/// Direct in-process connection to another gateway instance
pub struct LoopbackEndpoint {
    namespace: String,
    remote: Arc<Gateway>,
    origin: Weak<Gateway>,
    /// Remote session per caller identity, opened lazily
    sessions: tokio::sync::Mutex<HashMap<String, String>>,
}

impl LoopbackEndpoint {
    /// Connect `origin` to `remote`; the endpoint carries the remote's
    /// namespace
    #[must_use]
    pub fn new(remote: &Arc<Gateway>, origin: &Arc<Gateway>) -> Arc<Self> {
        Arc::new(Self {
            namespace: remote.namespace().to_string(),
            remote: Arc::clone(remote),
            origin: Arc::downgrade(origin),
            sessions: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    async fn session_for(&self, identity: &str) -> String {
        let mut sessions = self.sessions.lock().await;
        if let Some(token) = sessions.get(identity) {
            return token.clone();
        }
        let session = self.remote.open_session(identity);
        let token = session.token().to_string();
        sessions.insert(identity.to_string(), token.clone());
        token
    }
}

#[async_trait]
impl RemoteEndpoint for LoopbackEndpoint {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {
        let mut sessions = self.sessions.lock().await;
        for token in sessions.values() {
            self.remote.close_session(token).await;
        }
        sessions.clear();
    }

    async fn get(&self, identity: &str, address: &ResourceAddress) -> Result<AccessResponse> {
        let token = self.session_for(identity).await;
        Ok(self.remote.get(&token, address).await)
    }

    async fn set(
        &self,
        identity: &str,
        address: &ResourceAddress,
        value: Value,
    ) -> Result<AccessResponse> {
        let token = self.session_for(identity).await;
        Ok(self.remote.set(&token, address, value).await)
    }

    async fn act(
        &self,
        identity: &str,
        address: &ResourceAddress,
        parameters: Vec<Value>,
    ) -> Result<AccessResponse> {
        let token = self.session_for(identity).await;
        Ok(self.remote.act(&token, address, parameters).await)
    }

    async fn subscribe(
        &self,
        identity: &str,
        address: &ResourceAddress,
        sink: Arc<dyn NotificationSink>,
        request: SubscriptionRequest,
    ) -> Result<AccessResponse> {
        let token = self.session_for(identity).await;
        let sink = Arc::new(QualifyingSink {
            inner: sink,
            namespace: self.namespace.clone(),
        });
        Ok(self.remote.subscribe(&token, address, sink, request).await)
    }

    async fn unsubscribe(
        &self,
        identity: &str,
        address: &ResourceAddress,
        subscription: &str,
    ) -> Result<AccessResponse> {
        let token = self.session_for(identity).await;
        Ok(self.remote.unsubscribe(&token, address, subscription).await)
    }

    async fn providers(&self, identity: &str) -> Result<Vec<String>> {
        let token = self.session_for(identity).await;
        let response = self.remote.get_providers(&token, None).await;
        let providers = response.response["providers"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(providers)
    }

    async fn register_agent(
        &self,
        identity: &str,
        agent_id: &str,
        filter: Option<MessageFilter>,
    ) -> Result<()> {
        let sink = Arc::new(RelaySink {
            origin: self.origin.clone(),
            agent_id: agent_id.to_string(),
            namespace: self.namespace.clone(),
        });
        self.remote
            .register_relay_agent(agent_id, identity, filter, sink)
            .await;
        Ok(())
    }

    async fn unregister_agent(&self, agent_id: &str) -> Result<()> {
        self.remote.unregister_relay_agent(agent_id).await;
        Ok(())
    }
}
