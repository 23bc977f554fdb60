//! Canopy Gateway - device-tree gateway core for connected-device middleware
//!
//! This library provides the runtime core of the gateway:
//! - A live entity tree (providers → services → resources → attributes)
//! - Per-caller access control with memoized, access-filtered proxy views
//! - A FIFO notification engine with four delivery policies
//! - Namespace-keyed federation between gateway instances
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Wire bindings (external)              │
//! └────────────────────┬─────────────────────────────────┘
//!                      │ session token
//! ┌────────────────────▼─────────────────────────────────┐
//! │                    Gateway                            │
//! │  Sessions │ AccessTree │ Proxy views │ Registry       │
//! └──────┬──────────────────────────┬────────────────────┘
//!        │                          │ namespace-qualified ids
//! ┌──────▼───────────┐   ┌──────────▼───────────────────┐
//! │   Entity tree    │   │   Federation peers            │
//! │ (drivers update) │   │ (RemoteEndpoint transports)   │
//! └──────┬───────────┘   └──────────────────────────────┘
//!        │ messages
//! ┌──────▼───────────────────────────────────────────────┐
//! │   MessagePropagator: one FIFO dispatch worker         │
//! │   agents (access-gated) + callbacks (4 modes)         │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod access;
pub mod config;
pub mod daemon;
pub mod error;
pub mod federation;
pub mod gateway;
pub mod model;
pub mod notify;
pub mod proxy;
pub mod registry;
pub mod session;

pub use access::{AccessLevel, AccessMethod, AccessProfile, AccessTree, AccessTreeBuilder};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use federation::{LoopbackEndpoint, RemoteCore, RemoteEndpoint};
pub use gateway::{AccessResponse, Gateway, ResourceAddress, SubscriptionRequest};
pub use model::{
    Attribute, Constraint, Lifecycle, Provider, Resource, ResourceBuilder, ResourceKind,
    ResourcePath, Service, TypedValue, ValuePolicy, ValueType, WriteOrigin,
};
pub use notify::{
    DeliveryDefaults, DeliveryMode, EntityKind, ErrorPolicy, GatewayMessage, MessageConstraint,
    MessageFilter, MessageType, NotificationSink, Notifier, ResponseKind,
};
pub use proxy::{ProxyFactory, ResourceView};
pub use registry::{ModelRegistry, ProviderQuery};
pub use session::{Session, SessionManager};
