//! Notification engine tests through the gateway API
//!
//! Covers the delivery-mode laws, ordering, expiry and agent gating.

use std::sync::Arc;
use std::time::Duration;

use canopy_gateway::{
    AccessLevel, AccessMethod, AccessTreeBuilder, DeliveryMode, ErrorPolicy, GatewayMessage,
    MessageConstraint, ResourceAddress, SubscriptionRequest, WriteOrigin,
};
use serde_json::json;

mod common;
use common::{assert_silent, channel_sink, open_tree, recv_batch, thermometer_gateway};

fn new_value(message: &GatewayMessage) -> serde_json::Value {
    match message {
        GatewayMessage::ValueUpdated { new, .. } => new.clone(),
        other => panic!("expected value update, got {other:?}"),
    }
}

#[tokio::test]
async fn unary_subscriber_sees_updates_in_order() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");
    let address = ResourceAddress::new("p1", "s1", "temp");
    let (sink, mut rx) = channel_sink();

    let sub = gateway
        .subscribe(session.token(), &address, sink, SubscriptionRequest::default())
        .await;
    assert_eq!(sub.status, 200);

    let temp = gateway
        .provider("p1")
        .unwrap()
        .service("s1")
        .unwrap()
        .resource("temp")
        .unwrap();
    for i in 0..10 {
        temp.update(None, json!(f64::from(i)), WriteOrigin::Driver)
            .unwrap();
    }
    for i in 0..10 {
        let batch = recv_batch(&mut rx).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(new_value(&batch[0]), json!(f64::from(i)));
    }
}

#[tokio::test]
async fn repeated_value_reports_has_changed_false_and_unsubscribe_silences() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");
    let address = ResourceAddress::new("p1", "s1", "temp");
    let (sink, mut rx) = channel_sink();

    let sub = gateway
        .subscribe(session.token(), &address, sink, SubscriptionRequest::default())
        .await;
    let subscription = sub.response["subscriptionId"].as_str().unwrap().to_string();

    let temp = gateway
        .provider("p1")
        .unwrap()
        .service("s1")
        .unwrap()
        .resource("temp")
        .unwrap();

    temp.update(None, json!(21.5), WriteOrigin::Driver).unwrap();
    let batch = recv_batch(&mut rx).await;
    let GatewayMessage::ValueUpdated { has_changed, .. } = &batch[0] else {
        panic!("expected value update");
    };
    assert!(has_changed);

    temp.update(None, json!(21.5), WriteOrigin::Driver).unwrap();
    let batch = recv_batch(&mut rx).await;
    let GatewayMessage::ValueUpdated { has_changed, .. } = &batch[0] else {
        panic!("expected value update");
    };
    assert!(!has_changed);

    let unsub = gateway
        .unsubscribe(session.token(), &address, &subscription)
        .await;
    assert_eq!(unsub.status, 200);
    assert_eq!(unsub.response["removed"], json!(true));
    // Unsubscribing an unknown id succeeds with removed=false
    let again = gateway
        .unsubscribe(session.token(), &address, &subscription)
        .await;
    assert_eq!(again.response["removed"], json!(false));

    temp.update(None, json!(30.0), WriteOrigin::Driver).unwrap();
    assert_silent(&mut rx).await;
}

#[tokio::test]
async fn buffered_subscription_delivers_full_batches() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");
    let address = ResourceAddress::new("p1", "s1", "temp");
    let (sink, mut rx) = channel_sink();

    gateway
        .subscribe(
            session.token(),
            &address,
            sink,
            SubscriptionRequest {
                mode: DeliveryMode::Buffered { threshold: 4 },
                ..SubscriptionRequest::default()
            },
        )
        .await;

    let temp = gateway
        .provider("p1")
        .unwrap()
        .service("s1")
        .unwrap()
        .resource("temp")
        .unwrap();
    for i in 0..4 {
        temp.update(None, json!(f64::from(i)), WriteOrigin::Driver)
            .unwrap();
    }
    let batch = recv_batch(&mut rx).await;
    assert_eq!(batch.len(), 4);
    // Exactly one batch, no partial-then-duplicate delivery
    assert_silent(&mut rx).await;
}

#[tokio::test]
async fn scheduled_subscription_flushes_on_interval() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");
    let address = ResourceAddress::new("p1", "s1", "temp");
    let (sink, mut rx) = channel_sink();

    gateway
        .subscribe(
            session.token(),
            &address,
            sink,
            SubscriptionRequest {
                mode: DeliveryMode::Scheduled {
                    interval: Duration::from_millis(50),
                },
                ..SubscriptionRequest::default()
            },
        )
        .await;

    let temp = gateway
        .provider("p1")
        .unwrap()
        .service("s1")
        .unwrap()
        .resource("temp")
        .unwrap();
    temp.update(None, json!(1.0), WriteOrigin::Driver).unwrap();
    temp.update(None, json!(2.0), WriteOrigin::Driver).unwrap();

    let batch = recv_batch(&mut rx).await;
    assert_eq!(batch.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn expired_callback_receives_nothing_further() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");
    let address = ResourceAddress::new("p1", "s1", "temp");
    let (sink, mut rx) = channel_sink();

    gateway
        .subscribe(
            session.token(),
            &address,
            sink,
            SubscriptionRequest {
                lifetime: Some(Duration::from_secs(60)),
                ..SubscriptionRequest::default()
            },
        )
        .await;

    let temp = gateway
        .provider("p1")
        .unwrap()
        .service("s1")
        .unwrap()
        .resource("temp")
        .unwrap();

    temp.update(None, json!(1.0), WriteOrigin::Driver).unwrap();
    let batch = recv_batch(&mut rx).await;
    assert_eq!(batch.len(), 1);

    tokio::time::advance(Duration::from_secs(61)).await;

    temp.update(None, json!(2.0), WriteOrigin::Driver).unwrap();
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(rx.try_recv().is_err(), "expired callback was invoked");
}

#[tokio::test]
async fn constraints_are_anded_with_the_match() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");
    let address = ResourceAddress::new("p1", "s1", "temp");
    let (sink, mut rx) = channel_sink();

    gateway
        .subscribe(
            session.token(),
            &address,
            sink,
            SubscriptionRequest {
                constraints: vec![MessageConstraint::NewValueAbove(25.0)],
                ..SubscriptionRequest::default()
            },
        )
        .await;

    let temp = gateway
        .provider("p1")
        .unwrap()
        .service("s1")
        .unwrap()
        .resource("temp")
        .unwrap();
    temp.update(None, json!(20.0), WriteOrigin::Driver).unwrap();
    temp.update(None, json!(26.0), WriteOrigin::Driver).unwrap();

    let batch = recv_batch(&mut rx).await;
    assert_eq!(new_value(&batch[0]), json!(26.0));
    assert_silent(&mut rx).await;
}

#[tokio::test]
async fn failing_sink_does_not_disturb_other_callbacks() {
    struct FailingSink;

    #[async_trait::async_trait]
    impl canopy_gateway::NotificationSink for FailingSink {
        async fn deliver(&self, _messages: Vec<GatewayMessage>) -> canopy_gateway::Result<()> {
            Err(canopy_gateway::Error::Delivery("sink down".into()))
        }
    }

    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");
    let address = ResourceAddress::new("p1", "s1", "temp");

    gateway
        .subscribe(
            session.token(),
            &address,
            Arc::new(FailingSink),
            SubscriptionRequest {
                error_policy: ErrorPolicy::Stop,
                ..SubscriptionRequest::default()
            },
        )
        .await;
    let (sink, mut rx) = channel_sink();
    gateway
        .subscribe(session.token(), &address, sink, SubscriptionRequest::default())
        .await;

    let temp = gateway
        .provider("p1")
        .unwrap()
        .service("s1")
        .unwrap()
        .resource("temp")
        .unwrap();
    temp.update(None, json!(1.0), WriteOrigin::Driver).unwrap();
    temp.update(None, json!(2.0), WriteOrigin::Driver).unwrap();

    // The healthy callback still sees both updates, in order
    assert_eq!(new_value(&recv_batch(&mut rx).await[0]), json!(1.0));
    assert_eq!(new_value(&recv_batch(&mut rx).await[0]), json!(2.0));
}

#[tokio::test]
async fn agents_are_access_gated_per_message() {
    // Value updates under /p1 imply GET, which needs Authenticated;
    // the watcher only resolves to Anonymous, so it sees lifecycle
    // (DESCRIBE) messages but no values.
    let tree = Arc::new(
        AccessTreeBuilder::new()
            .default_level("/", AccessLevel::Anonymous)
            .minimum("/p1", AccessMethod::Get, AccessLevel::Authenticated)
            .build(),
    );
    let gateway = thermometer_gateway("local", tree);
    let session = gateway.open_session("watcher");
    let (sink, mut rx) = channel_sink();

    let agent_id = gateway
        .register_agent(session.token(), None, sink)
        .await
        .unwrap();

    let temp = gateway
        .provider("p1")
        .unwrap()
        .service("s1")
        .unwrap()
        .resource("temp")
        .unwrap();
    temp.update(None, json!(1.0), WriteOrigin::Driver).unwrap();
    // Stopping emits DISAPPEARING lifecycle messages the agent may see
    gateway.provider("p1").unwrap().stop();

    // Drain until the provider-level disappearing arrives; the gated value
    // update must never show up along the way
    loop {
        let batch = recv_batch(&mut rx).await;
        let mut done = false;
        for message in batch {
            assert!(
                !matches!(message, GatewayMessage::ValueUpdated { .. }),
                "value update should have been gated, got {message:?}"
            );
            if matches!(&message, GatewayMessage::Disappearing { path, .. } if path == "/p1") {
                done = true;
            }
        }
        if done {
            break;
        }
    }

    // Unregistering twice is a no-op
    gateway.unregister_agent(&agent_id).await;
    gateway.unregister_agent(&agent_id).await;
}
