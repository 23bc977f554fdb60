//! Gateway boundary-operation tests
//!
//! Exercises the northbound API end to end: access filtering, write
//! invariants, status-code mapping and listings.

use std::sync::Arc;

use canopy_gateway::{
    AccessLevel, AccessMethod, AccessTreeBuilder, Attribute, Constraint, ResourceAddress,
    ResourceBuilder, ResourceKind, SubscriptionRequest, ValuePolicy, ValueType,
};
use serde_json::json;

mod common;
use common::{add_thermometer, channel_sink, open_tree, thermometer_gateway};

#[tokio::test]
async fn get_set_round_trip() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");
    let address = ResourceAddress::new("p1", "s1", "setpoint");

    let set = gateway.set(session.token(), &address, json!(19.5)).await;
    assert_eq!(set.status, 200);
    assert_eq!(set.response["value"], json!(19.5));
    assert_eq!(set.response["hasChanged"], json!(true));

    let get = gateway.get(session.token(), &address).await;
    assert_eq!(get.status, 200);
    assert_eq!(get.uri, "/p1/s1/setpoint");
    assert_eq!(get.response["value"], json!(19.5));
}

#[tokio::test]
async fn set_on_sensor_is_not_applicable() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");
    let address = ResourceAddress::new("p1", "s1", "temp");

    let response = gateway.set(session.token(), &address, json!(1.0)).await;
    assert_eq!(response.status, 420);
}

#[tokio::test]
async fn get_on_action_is_not_applicable() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");
    let address = ResourceAddress::new("p1", "s1", "reboot");

    let response = gateway.get(session.token(), &address).await;
    assert_eq!(response.status, 420);

    let act = gateway
        .act(session.token(), &address, vec![json!("now"), json!(5)])
        .await;
    assert_eq!(act.status, 200);
    assert_eq!(act.response["result"]["accepted"], json!(2));
}

#[tokio::test]
async fn unknown_segments_are_not_found() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");

    for address in [
        ResourceAddress::new("ghost", "s1", "temp"),
        ResourceAddress::new("p1", "ghost", "temp"),
        ResourceAddress::new("p1", "s1", "ghost"),
    ] {
        let response = gateway.get(session.token(), &address).await;
        assert_eq!(response.status, 404);
    }
}

#[tokio::test]
async fn unauthorized_method_is_rejected_without_leaking() {
    // Guests resolve to Anonymous: reads are public, writes are not
    let tree = Arc::new(
        AccessTreeBuilder::new()
            .default_level("/", AccessLevel::Anonymous)
            .grant("/", "operator", AccessLevel::Authenticated)
            .build(),
    );
    let gateway = thermometer_gateway("local", tree);
    let guest = gateway.open_session("guest");
    let operator = gateway.open_session("operator");
    let address = ResourceAddress::new("p1", "s1", "setpoint");

    let denied = gateway.set(guest.token(), &address, json!(1.0)).await;
    assert_eq!(denied.status, 403);

    // The value is untouched and still writable by an authorized caller
    let allowed = gateway.set(operator.token(), &address, json!(2.0)).await;
    assert_eq!(allowed.status, 200);
    let get = gateway.get(guest.token(), &address).await;
    assert_eq!(get.response["value"], json!(2.0));
}

#[tokio::test]
async fn constraint_violation_leaves_prior_value() {
    let gateway = thermometer_gateway("local", open_tree());
    let provider = gateway.provider("p1").unwrap();
    let service = provider.service("s1").unwrap();
    service
        .add_resource(
            ResourceBuilder::new("mode", ResourceKind::Property)
                .value_type(ValueType::String)
                .attribute(
                    Attribute::new("value", ValueType::String, ValuePolicy::Modifiable)
                        .with_constraint(Constraint::OneOf(vec![json!("eco"), json!("boost")])),
                ),
        )
        .unwrap();

    let session = gateway.open_session("alice");
    let address = ResourceAddress::new("p1", "s1", "mode");

    assert_eq!(
        gateway
            .set(session.token(), &address, json!("eco"))
            .await
            .status,
        200
    );
    let rejected = gateway
        .set(session.token(), &address, json!("turbo"))
        .await;
    assert_eq!(rejected.status, 400);

    let get = gateway.get(session.token(), &address).await;
    assert_eq!(get.response["value"], json!("eco"));
}

#[tokio::test]
async fn listings_omit_inaccessible_entries() {
    // DESCRIBE on /p2 needs Admin; everyone else sees only p1
    let tree = Arc::new(
        AccessTreeBuilder::new()
            .default_level("/", AccessLevel::Authenticated)
            .minimum("/p2", AccessMethod::Describe, AccessLevel::Admin)
            .grant("/p2", "root", AccessLevel::Admin)
            .build(),
    );
    let gateway = thermometer_gateway("local", tree);
    add_thermometer(&gateway, "p2");

    let alice = gateway.open_session("alice");
    let listing = gateway.get_providers(alice.token(), None).await;
    assert_eq!(listing.response["providers"], json!(["p1"]));

    let root = gateway.open_session("root");
    let listing = gateway.get_providers(root.token(), None).await;
    assert_eq!(listing.response["providers"], json!(["p1", "p2"]));

    // Silently omitted in get_all too, and unauthorized describe is
    // indistinguishable from absent
    let all = gateway.get_all(alice.token(), None);
    let uris: Vec<&str> = all.response["all"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["uri"].as_str().unwrap())
        .collect();
    assert!(uris.iter().all(|uri| !uri.starts_with("/p2")));

    let denied = gateway.describe(alice.token(), "/p2");
    let absent = gateway.describe(alice.token(), "/p9");
    assert_eq!(denied.status, absent.status);
    assert_eq!(denied.status, 404);
}

#[tokio::test]
async fn resource_listing_reports_capability() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");

    let listing = gateway.get_resources(session.token(), "p1", "s1");
    assert_eq!(listing.status, 200);
    let resources = listing.response["resources"].as_array().unwrap();
    let rws = |name: &str| {
        resources
            .iter()
            .find(|r| r["name"] == name)
            .map(|r| r["rws"].clone())
    };
    assert_eq!(rws("temp"), Some(json!("RO")));
    assert_eq!(rws("setpoint"), Some(json!("RW")));
    // Actions carry no capability marker
    assert_eq!(rws("reboot"), Some(json!(null)));
}

#[tokio::test]
async fn stopped_provider_disappears_from_api() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");
    let address = ResourceAddress::new("p1", "s1", "temp");

    assert_eq!(gateway.get(session.token(), &address).await.status, 200);

    gateway.provider("p1").unwrap().stop();
    assert_eq!(gateway.get(session.token(), &address).await.status, 404);
    let listing = gateway.get_providers(session.token(), None).await;
    assert_eq!(listing.response["providers"], json!([]));
}

#[tokio::test]
async fn closed_session_is_rejected_and_cascades() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");
    let token = session.token().to_string();
    let address = ResourceAddress::new("p1", "s1", "temp");

    let (sink, mut rx) = channel_sink();
    let sub = gateway
        .subscribe(&token, &address, sink, SubscriptionRequest::default())
        .await;
    assert_eq!(sub.status, 200);

    gateway.close_session(&token).await;
    // Closing again is a no-op
    gateway.close_session(&token).await;

    let response = gateway.get(&token, &address).await;
    assert_eq!(response.status, 403);

    // The owned subscription died with the session
    gateway
        .provider("p1")
        .unwrap()
        .service("s1")
        .unwrap()
        .resource("temp")
        .unwrap()
        .update(None, json!(5.0), canopy_gateway::WriteOrigin::Driver)
        .unwrap();
    common::assert_silent(&mut rx).await;
}

#[tokio::test]
async fn describe_walks_the_tree() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");

    let provider = gateway.describe(session.token(), "/p1");
    assert_eq!(provider.status, 200);
    assert_eq!(provider.response["name"], json!("p1"));

    let service = gateway.describe(session.token(), "/p1/s1");
    assert_eq!(service.status, 200);

    let resource = gateway.describe(session.token(), "/p1/s1/temp");
    assert_eq!(resource.status, 200);
    assert_eq!(resource.response["type"], json!("SENSOR"));
    assert_eq!(resource.response["rws"], json!("RO"));
}

#[tokio::test]
async fn admin_service_is_seeded() {
    let gateway = thermometer_gateway("local", open_tree());
    let session = gateway.open_session("alice");

    let services = gateway.get_services(session.token(), "p1");
    let names = services.response["services"].as_array().unwrap();
    assert!(names.contains(&json!("admin")));

    let set = gateway
        .set(
            session.token(),
            &ResourceAddress::new("p1", "admin", "friendlyName"),
            json!("Living room probe"),
        )
        .await;
    assert_eq!(set.status, 200);
}
