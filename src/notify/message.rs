//! Typed messages produced by the entity tree
//!
//! Every state change, lifecycle transition, call response and error flows
//! through the propagator as a [`GatewayMessage`]. Messages are serializable
//! so federation peers can relay them verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::access::AccessMethod;

/// Kind of entity a lifecycle message refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Top-level device/provider node
    Provider,
    /// Service grouping under a provider
    Service,
    /// Resource under a service
    Resource,
}

/// Response kinds mirrored back through the notification engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseKind {
    /// Response to a GET call
    GetResponse,
    /// Response to a SET call
    SetResponse,
    /// Response to an ACT call
    ActResponse,
    /// Response to a SUBSCRIBE call
    SubscribeResponse,
    /// Response to an UNSUBSCRIBE call
    UnsubscribeResponse,
    /// Response to a DESCRIBE call
    DescribeResponse,
    /// Error outcome
    Error,
}

impl ResponseKind {
    /// Access method that originated this response kind
    #[must_use]
    pub const fn originating_method(self) -> AccessMethod {
        match self {
            Self::GetResponse => AccessMethod::Get,
            Self::SetResponse => AccessMethod::Set,
            Self::ActResponse => AccessMethod::Act,
            Self::SubscribeResponse => AccessMethod::Subscribe,
            Self::UnsubscribeResponse => AccessMethod::Unsubscribe,
            Self::DescribeResponse | Self::Error => AccessMethod::Describe,
        }
    }
}

/// Coarse message categories used by subscription filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Entity became visible (started)
    LifecycleAppearing,
    /// Entity disappeared (stopped)
    LifecycleDisappearing,
    /// Attribute value changed or was re-set
    AttributeValueUpdated,
    /// A call response relayed through the engine
    Response,
    /// An error notification
    Error,
}

/// A message flowing through the notification engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayMessage {
    /// An entity transitioned to STARTED and became visible
    Appearing {
        /// Path of the entity
        path: String,
        /// Kind of entity
        entity: EntityKind,
        /// Initial description of the entity
        description: Value,
    },
    /// An entity transitioned to STOPPED
    Disappearing {
        /// Path of the entity
        path: String,
        /// Kind of entity
        entity: EntityKind,
    },
    /// An attribute value was written
    ValueUpdated {
        /// Path of the attribute (`/provider/service/resource/attribute`)
        path: String,
        /// Previous value
        old: Value,
        /// New value
        new: Value,
        /// Instant of the write
        timestamp: DateTime<Utc>,
        /// Whether the stored value actually changed
        has_changed: bool,
        /// Full description of the attribute after the write
        description: Value,
    },
    /// A call response relayed to subscribers
    Response {
        /// Response kind
        response: ResponseKind,
        /// Target URI of the original call
        path: String,
        /// Status code of the response
        status: u16,
        /// Response payload
        payload: Value,
    },
    /// An error surfaced through the engine
    Error {
        /// URI the error relates to
        path: String,
        /// Human-readable detail
        detail: String,
    },
}

impl GatewayMessage {
    /// Path the message refers to
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Appearing { path, .. }
            | Self::Disappearing { path, .. }
            | Self::ValueUpdated { path, .. }
            | Self::Response { path, .. }
            | Self::Error { path, .. } => path,
        }
    }

    /// Coarse type used for filter matching
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::Appearing { .. } => MessageType::LifecycleAppearing,
            Self::Disappearing { .. } => MessageType::LifecycleDisappearing,
            Self::ValueUpdated { .. } => MessageType::AttributeValueUpdated,
            Self::Response { .. } => MessageType::Response,
            Self::Error { .. } => MessageType::Error,
        }
    }

    /// Access method implied by the message kind, used to gate agent delivery
    #[must_use]
    pub const fn implied_method(&self) -> AccessMethod {
        match self {
            Self::Appearing { .. } | Self::Disappearing { .. } | Self::Error { .. } => {
                AccessMethod::Describe
            }
            Self::ValueUpdated { .. } => AccessMethod::Get,
            Self::Response { response, .. } => response.originating_method(),
        }
    }

    /// Rewrite the message path with a namespace-qualified provider id.
    ///
    /// Used when relaying a message to a caller whose gateway instance is not
    /// the provider's origin.
    #[must_use]
    pub fn qualified(mut self, namespace: &str) -> Self {
        let qualify = |p: &mut String| {
            if let Some(rest) = p.strip_prefix('/') {
                *p = format!("/{namespace}:{rest}");
            }
        };
        match &mut self {
            Self::Appearing { path, .. }
            | Self::Disappearing { path, .. }
            | Self::ValueUpdated { path, .. }
            | Self::Response { path, .. }
            | Self::Error { path, .. } => qualify(path),
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implied_method_per_kind() {
        let m = GatewayMessage::Appearing {
            path: "/p".into(),
            entity: EntityKind::Provider,
            description: Value::Null,
        };
        assert_eq!(m.implied_method(), AccessMethod::Describe);

        let m = GatewayMessage::ValueUpdated {
            path: "/p/s/r/value".into(),
            old: Value::Null,
            new: Value::from(1),
            timestamp: Utc::now(),
            has_changed: true,
            description: Value::Null,
        };
        assert_eq!(m.implied_method(), AccessMethod::Get);

        let m = GatewayMessage::Response {
            response: ResponseKind::ActResponse,
            path: "/p/s/r".into(),
            status: 200,
            payload: Value::Null,
        };
        assert_eq!(m.implied_method(), AccessMethod::Act);
    }

    #[test]
    fn qualification_prefixes_provider_segment() {
        let m = GatewayMessage::Disappearing {
            path: "/p1/s1".into(),
            entity: EntityKind::Service,
        };
        assert_eq!(m.qualified("north").path(), "/north:p1/s1");
    }
}
