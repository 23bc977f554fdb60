//! Agents: cross-cutting, access-gated notification subscribers
//!
//! Unlike filter-scoped callbacks, an agent sees every message whose implied
//! access method its identity may invoke on the message path. Accessibility
//! is resolved through the agent's [`AccessProfile`], which memoizes per
//! path.

use std::sync::Arc;

use uuid::Uuid;

use super::callback::NotificationSink;
use super::filter::MessageFilter;
use super::message::GatewayMessage;
use crate::access::AccessProfile;

/// A registered agent
pub struct Agent {
    id: String,
    profile: AccessProfile,
    filter: Option<MessageFilter>,
    sink: Arc<dyn NotificationSink>,
    /// Session that owns this agent, when opened northbound
    owner: Option<String>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("identity", &self.profile.identity())
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Create an agent with a generated `agent-` id
    #[must_use]
    pub fn new(
        profile: AccessProfile,
        filter: Option<MessageFilter>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            id: format!("agent-{}", Uuid::new_v4()),
            profile,
            filter,
            sink,
            owner: None,
        }
    }

    /// Create an agent with a caller-supplied id (federation mirroring)
    #[must_use]
    pub fn with_id(
        id: impl Into<String>,
        profile: AccessProfile,
        filter: Option<MessageFilter>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            id: id.into(),
            profile,
            filter,
            sink,
            owner: None,
        }
    }

    /// Bind the agent to an owning session token
    #[must_use]
    pub fn owned_by(mut self, token: impl Into<String>) -> Self {
        self.owner = Some(token.into());
        self
    }

    /// Agent id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owning session token, if any
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// The sink receiving deliveries
    #[must_use]
    pub fn sink(&self) -> Arc<dyn NotificationSink> {
        Arc::clone(&self.sink)
    }

    /// Whether this agent should receive `message`.
    ///
    /// The message's implied access method must be accessible to the agent's
    /// identity on the message path, and the optional filter must match.
    #[must_use]
    pub fn accepts(&self, message: &GatewayMessage) -> bool {
        if let Some(filter) = &self.filter
            && !filter.matches(message)
        {
            return false;
        }
        self.profile
            .can(message.path(), message.implied_method())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessLevel, AccessMethod, AccessTreeBuilder};
    use crate::notify::EntityKind;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NullSink;

    #[async_trait]
    impl NotificationSink for NullSink {
        async fn deliver(&self, _messages: Vec<GatewayMessage>) -> crate::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn agent_delivery_is_access_gated() {
        let tree = Arc::new(
            AccessTreeBuilder::new()
                .default_level("/", AccessLevel::Anonymous)
                .minimum("/secret", AccessMethod::Get, AccessLevel::Admin)
                .build(),
        );
        let agent = Agent::new(
            AccessProfile::new(tree, "watcher"),
            None,
            Arc::new(NullSink),
        );

        let visible = GatewayMessage::ValueUpdated {
            path: "/open/s/r/value".into(),
            old: Value::Null,
            new: Value::from(1),
            timestamp: chrono::Utc::now(),
            has_changed: true,
            description: Value::Null,
        };
        assert!(agent.accepts(&visible));

        let gated = GatewayMessage::ValueUpdated {
            path: "/secret/s/r/value".into(),
            old: Value::Null,
            new: Value::from(1),
            timestamp: chrono::Utc::now(),
            has_changed: true,
            description: Value::Null,
        };
        assert!(!agent.accepts(&gated));

        // Lifecycle implies DESCRIBE, which stays anonymous-visible
        let lifecycle = GatewayMessage::Appearing {
            path: "/secret".into(),
            entity: EntityKind::Provider,
            description: Value::Null,
        };
        assert!(agent.accepts(&lifecycle));
    }
}
