//! Shared test utilities

#![allow(dead_code, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canopy_gateway::{
    AccessLevel, AccessTree, AccessTreeBuilder, DeliveryDefaults, Gateway, GatewayMessage,
    NotificationSink, Provider, ResourceBuilder, ResourceKind, ValueType,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Sink forwarding each delivered batch into a channel
pub struct ChannelSink {
    tx: UnboundedSender<Vec<GatewayMessage>>,
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn deliver(&self, messages: Vec<GatewayMessage>) -> canopy_gateway::Result<()> {
        let _ = self.tx.send(messages);
        Ok(())
    }
}

/// Create a channel-backed sink and its receiving end
#[must_use]
pub fn channel_sink() -> (Arc<ChannelSink>, UnboundedReceiver<Vec<GatewayMessage>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(ChannelSink { tx }), rx)
}

/// Await the next delivered batch, failing the test after two seconds
pub async fn recv_batch(rx: &mut UnboundedReceiver<Vec<GatewayMessage>>) -> Vec<GatewayMessage> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("delivery timed out")
        .expect("sink channel closed")
}

/// Await the next value-update message, skipping lifecycle noise
pub async fn recv_value_update(
    rx: &mut UnboundedReceiver<Vec<GatewayMessage>>,
) -> (String, serde_json::Value) {
    loop {
        for message in recv_batch(rx).await {
            if let GatewayMessage::ValueUpdated { path, new, .. } = message {
                return (path, new);
            }
        }
    }
}

/// Assert that nothing more is delivered within a grace period
pub async fn assert_silent(rx: &mut UnboundedReceiver<Vec<GatewayMessage>>) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "unexpected delivery");
}

/// Everyone-is-authenticated tree: reads and writes open to all callers
#[must_use]
pub fn open_tree() -> Arc<AccessTree> {
    Arc::new(
        AccessTreeBuilder::new()
            .default_level("/", AccessLevel::Authenticated)
            .build(),
    )
}

/// A started gateway with a thermometer provider:
/// `p1/s1/temp` (Sensor, float), `p1/s1/setpoint` (Property, float),
/// `p1/s1/reboot` (Action echoing its parameter count).
pub fn thermometer_gateway(namespace: &str, tree: Arc<AccessTree>) -> Arc<Gateway> {
    let gateway = Gateway::new(namespace, tree, DeliveryDefaults::default());
    gateway.start();
    add_thermometer(&gateway, "p1");
    gateway
}

/// Register and start a thermometer provider on an existing gateway
pub fn add_thermometer(gateway: &Arc<Gateway>, name: &str) -> Arc<Provider> {
    let provider = gateway.create_provider(name).expect("provider");
    let service = provider.add_service("s1").expect("service");
    service
        .add_resource(ResourceBuilder::new("temp", ResourceKind::Sensor).value_type(ValueType::Float))
        .expect("temp");
    service
        .add_resource(
            ResourceBuilder::new("setpoint", ResourceKind::Property).value_type(ValueType::Float),
        )
        .expect("setpoint");
    service
        .add_resource(
            ResourceBuilder::new("reboot", ResourceKind::Action)
                .act_handler(|params| Ok(serde_json::json!({ "accepted": params.len() }))),
        )
        .expect("reboot");
    provider.start();
    provider
}
