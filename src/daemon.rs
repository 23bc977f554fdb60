//! Daemon - runs a configured gateway instance
//!
//! Wires the gateway together from [`Config`], optionally spawns a simulated
//! provider (and a federated twin instance) and runs until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::access::{AccessLevel, AccessTree, AccessTreeBuilder};
use crate::federation::LoopbackEndpoint;
use crate::gateway::{Gateway, ResourceAddress, SubscriptionRequest};
use crate::model::{ResourceBuilder, ResourceKind, ValueType, WriteOrigin};
use crate::notify::{GatewayMessage, NotificationSink};
use crate::{Config, Result};

/// Sink that logs every delivered message
struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn deliver(&self, messages: Vec<GatewayMessage>) -> Result<()> {
        for message in messages {
            match &message {
                GatewayMessage::ValueUpdated {
                    path,
                    new,
                    has_changed,
                    ..
                } => {
                    tracing::info!(%path, value = %new, has_changed, "update");
                }
                other => tracing::info!(path = other.path(), kind = ?other.message_type(), "event"),
            }
        }
        Ok(())
    }
}

/// The Canopy daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a daemon from loaded configuration
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Open-by-default access tree used when no policy collaborator is
    /// wired in: anyone may read, authenticated callers may write.
    fn default_tree() -> Arc<AccessTree> {
        Arc::new(
            AccessTreeBuilder::new()
                .default_level("/", AccessLevel::Authenticated)
                .build(),
        )
    }

    /// Run until ctrl-c.
    ///
    /// # Errors
    ///
    /// Returns setup errors; runtime delivery errors are logged, not fatal.
    pub async fn run(self, simulate: bool) -> Result<()> {
        let gateway = Gateway::new(
            self.config.namespace.clone(),
            Self::default_tree(),
            self.config.delivery.defaults(),
        );
        gateway.start();
        tracing::info!(namespace = gateway.namespace(), "gateway started");

        if simulate {
            self.spawn_simulation(&gateway).await?;
        }

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutting down");
        gateway.shutdown().await;
        Ok(())
    }

    /// Register the simulated provider and subscribe a logging session
    async fn spawn_simulation(&self, gateway: &Arc<Gateway>) -> Result<()> {
        let sim = &self.config.simulation;
        let provider = gateway.create_provider(&sim.provider)?;
        let sensors = provider.add_service("sensors")?;
        let temperature = sensors.add_resource(
            ResourceBuilder::new("temperature", ResourceKind::Sensor).value_type(ValueType::Float),
        )?;
        provider.start();

        let session = gateway.open_session("simulator");
        let address = ResourceAddress::new(sim.provider.clone(), "sensors", "temperature");
        let response = gateway
            .subscribe(
                session.token(),
                &address,
                Arc::new(TracingSink),
                SubscriptionRequest::default(),
            )
            .await;
        if !response.is_success() {
            tracing::warn!(status = response.status, "simulation subscribe failed");
        }

        let interval = Duration::from_secs(self.config.simulation.update_interval_secs.max(1));
        let driver = Arc::clone(&temperature);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut step = 0u64;
            loop {
                ticker.tick().await;
                // Deterministic sawtooth around 20 degrees
                #[allow(clippy::cast_precision_loss)]
                let value = 20.0 + (step % 8) as f64 * 0.5;
                step += 1;
                if let Err(e) = driver.update(None, json!(value), WriteOrigin::Driver) {
                    tracing::warn!(error = %e, "simulated update rejected");
                }
            }
        });

        if sim.federate {
            self.spawn_twin(gateway).await?;
        }
        Ok(())
    }

    /// Build an in-process peer instance and connect it via loopback
    async fn spawn_twin(&self, gateway: &Arc<Gateway>) -> Result<()> {
        let sim = &self.config.simulation;
        let twin = Gateway::new(
            sim.peer_namespace.clone(),
            Self::default_tree(),
            self.config.delivery.defaults(),
        );
        twin.start();
        let provider = twin.create_provider("twin-lamp")?;
        let lights = provider.add_service("lights")?;
        lights.add_resource(
            ResourceBuilder::new("brightness", ResourceKind::Property).value_type(ValueType::Int),
        )?;
        provider.start();

        let endpoint = LoopbackEndpoint::new(&twin, gateway);
        gateway.connect_peer(endpoint).await?;

        let session = gateway.open_session("simulator");
        let listing = gateway.get_providers(session.token(), None).await;
        tracing::info!(providers = %listing.response["providers"], "federated view");
        gateway.close_session(session.token()).await;
        Ok(())
    }
}
