//! Notification and subscription engine
//!
//! Single ingestion point for every message produced by the entity tree.
//! Producers push into an unbounded queue; one dispatch worker per gateway
//! instance pops strictly in push order and fans out to agents (access-gated)
//! and to filter-bound callbacks under their delivery policies.

mod agent;
mod callback;
mod filter;
mod message;
mod propagator;

use tokio::sync::mpsc::UnboundedSender;

pub use agent::Agent;
pub use callback::{Callback, DeliveryMode, ErrorPolicy, NotificationSink};
pub use filter::{MessageConstraint, MessageFilter};
pub use message::{EntityKind, GatewayMessage, MessageType, ResponseKind};
pub use propagator::{DeliveryDefaults, MessagePropagator};

/// Event consumed by the dispatch worker
#[derive(Debug)]
pub(crate) enum PropagatorEvent {
    /// A message published by the entity tree or the gateway
    Publish(GatewayMessage),
    /// A scheduled-delivery timer asking for a buffer flush
    Flush(String),
}

/// Cloneable publishing handle handed to entity-tree nodes.
///
/// Sending is non-blocking and best-effort: once the propagator is shut down
/// messages are silently dropped.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Option<UnboundedSender<PropagatorEvent>>,
}

impl Notifier {
    /// A notifier that drops everything; useful for detached model nodes
    #[must_use]
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    pub(crate) const fn new(tx: UnboundedSender<PropagatorEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Publish a message into the dispatch queue
    pub fn send(&self, message: GatewayMessage) {
        if let Some(tx) = &self.tx
            && tx.send(PropagatorEvent::Publish(message)).is_err()
        {
            tracing::debug!("propagator gone, dropping message");
        }
    }
}
