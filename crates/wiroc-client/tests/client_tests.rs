//! Client Library Tests (wiroc-client)
//!
//! Tests for the high-level WiRoc client API including:
//! - Builder and configuration
//! - Connection lifecycle and handshake
//! - Property reads, writes and the cache
//! - Request serialization
//! - Link loss and teardown
//! - Punch and test punch streams

use std::sync::Arc;
use std::time::Duration;
use wiroc_client::{
    ClientError, ConnectionState, DeviceConnected, DeviceDisconnected, PropertiesChanged,
    PunchBatch, TestPunchBatch, WirocBuilder, WirocClient,
};
use wiroc_core::{BulkSchema, Channel, DeviceId, Error, PropertyValue, Record, TestPunchStatus};
use wiroc_test_utils::{wait_until, EventCollector, SimulatedDevice, DEFAULT_TIMEOUT};
use wiroc_transport::{MockLink, TransportError};

const ADDRESS: &str = "B8:27:EB:11:22:33";

fn device_id() -> DeviceId {
    DeviceId::from(ADDRESS)
}

/// A link with one simulated device attached
fn setup() -> (Arc<MockLink>, SimulatedDevice) {
    let link = Arc::new(MockLink::new());
    let device = SimulatedDevice::new(ADDRESS);
    device.attach(&link);
    (link, device)
}

async fn connected_client(builder: WirocBuilder) -> (WirocClient, Arc<MockLink>, SimulatedDevice) {
    let (link, device) = setup();
    let client = builder.build(link.clone()).expect("build failed");
    client.connect(&device_id()).await.expect("connect failed");
    (client, link, device)
}

fn record(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// Builder Tests
// ============================================================================

#[tokio::test]
async fn test_builder_rejects_invalid_schema() {
    let (link, _device) = setup();
    let result = WirocBuilder::new()
        .bulk_schema(BulkSchema {
            version: 9,
            names: &["channel", "channel"],
        })
        .build(link);

    assert!(matches!(
        result,
        Err(ClientError::Protocol(Error::Schema(_)))
    ));
}

#[test]
fn test_builder_requires_runtime() {
    let (link, _device) = setup();
    assert!(matches!(
        WirocClient::new(link),
        Err(ClientError::Config(_))
    ));
}

// ============================================================================
// Connection Lifecycle
// ============================================================================

#[tokio::test]
async fn test_connect_runs_handshake() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();

    assert!(client.is_connected(&id));
    assert_eq!(client.state(&id), ConnectionState::Connected);
    assert_eq!(link.payloads(Channel::Properties), vec!["all\t20|"]);
    assert!(link.is_monitoring(&id, Channel::Properties));

    assert_eq!(
        client.cached(&id, "wirocdevicename"),
        Some(PropertyValue::Text("WiRoc-Test".into()))
    );
    assert_eq!(
        client.cached(&id, "loramode"),
        Some(PropertyValue::Enum("RECEIVER".into()))
    );
    assert_eq!(
        client.cached(&id, "btaddress"),
        Some(PropertyValue::Text(ADDRESS.into()))
    );
}

#[tokio::test]
async fn test_connect_notifies_observers() {
    let (link, _device) = setup();
    let client = WirocClient::new(link).unwrap();
    let connected = EventCollector::<DeviceConnected>::new();
    let _sub = client.on_device_connected(connected.callback());

    client.connect(&device_id()).await.unwrap();

    assert_eq!(connected.count(), 1);
    assert_eq!(connected.last().unwrap().device, device_id());
}

#[tokio::test]
async fn test_connect_twice_is_noop() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;

    client.connect(&device_id()).await.unwrap();
    assert_eq!(link.payloads(Channel::Properties).len(), 1);
}

#[tokio::test]
async fn test_concurrent_connects_share_one_session() {
    let (link, _device) = setup();
    let client = WirocClient::new(link.clone()).unwrap();
    let id = device_id();

    let (a, b) = tokio::join!(client.connect(&id), client.connect(&id));
    a.unwrap();
    b.unwrap();

    assert_eq!(link.payloads(Channel::Properties).len(), 1);
}

#[tokio::test]
async fn test_connect_without_handshake() {
    let (client, link, _device) = connected_client(WirocBuilder::new().handshake(false)).await;
    let id = device_id();

    assert!(client.is_connected(&id));
    assert!(link.writes().is_empty());
    assert_eq!(client.cached(&id, "batterylevel"), None);

    let level = client.get_property(&id, "batterylevel").await.unwrap();
    assert_eq!(level, PropertyValue::Int(87));
    assert_eq!(link.payloads(Channel::Properties), vec!["batterylevel|"]);
}

#[tokio::test]
async fn test_scan_timeout_is_device_not_found() {
    let link = Arc::new(MockLink::new());
    let client = WirocBuilder::new()
        .scan_timeout(Duration::from_millis(50))
        .build(link)
        .unwrap();

    let result = client.connect(&device_id()).await;
    assert!(matches!(result, Err(ClientError::DeviceNotFound(_))));
    assert_eq!(client.state(&device_id()), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_device_found_during_scan() {
    let link = Arc::new(MockLink::new());
    let device = SimulatedDevice::new(ADDRESS);
    device.answer_on(&link);
    link.set_discoverable(device_id());

    let client = WirocBuilder::new()
        .scan_timeout(Duration::from_secs(2))
        .build(link)
        .unwrap();

    client.connect(&device_id()).await.unwrap();
    assert!(client.is_connected(&device_id()));
}

#[tokio::test]
async fn test_failed_connect_returns_to_disconnected() {
    let (link, _device) = setup();
    link.fail_connect(true);
    let client = WirocClient::new(link).unwrap();

    let result = client.connect(&device_id()).await;
    assert!(matches!(
        result,
        Err(ClientError::Transport(TransportError::ConnectionFailed(_)))
    ));
    assert_eq!(client.state(&device_id()), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_failed_handshake_tears_down() {
    let (link, device) = setup();
    device.mute(true);
    let client = WirocBuilder::new()
        .request_timeout(Duration::from_millis(50))
        .build(link.clone())
        .unwrap();

    let result = client.connect(&device_id()).await;
    assert!(matches!(result, Err(ClientError::Timeout)));
    assert_eq!(client.state(&device_id()), ConnectionState::Disconnected);
    assert!(!link.is_connected(&device_id()));
}

#[tokio::test]
async fn test_expected_disconnect() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    let disconnected = EventCollector::<DeviceDisconnected>::new();
    let _sub = client.on_device_disconnected(disconnected.callback());

    client.disconnect(&id).await.unwrap();

    assert_eq!(client.state(&id), ConnectionState::Disconnected);
    assert!(!link.is_connected(&id));
    assert_eq!(client.cached(&id, "batterylevel"), None);
    assert_eq!(disconnected.count(), 1);
    assert!(disconnected.last().unwrap().was_expected);

    // The link's own disconnect event must not be reported a second time
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(disconnected.count(), 1);

    // Disconnecting again is a no-op
    client.disconnect(&id).await.unwrap();
    assert_eq!(disconnected.count(), 1);
}

#[tokio::test]
async fn test_reconnect_right_after_disconnect() {
    let (client, _link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    let disconnected = EventCollector::<DeviceDisconnected>::new();
    let _sub = client.on_device_disconnected(disconnected.callback());

    client.disconnect(&id).await.unwrap();
    client.connect(&id).await.unwrap();

    // Give the link's event for the first disconnect time to land
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(client.is_connected(&id));
    assert_eq!(disconnected.count(), 1);
    assert!(disconnected.last().unwrap().was_expected);
    assert_eq!(
        client.get_property(&id, "batterylevel").await.unwrap(),
        PropertyValue::Int(87)
    );
}

#[tokio::test]
async fn test_stale_link_event_spares_new_handshake() {
    let (client, link, device) = connected_client(WirocBuilder::new()).await;
    let client = Arc::new(client);
    let id = device_id();

    client.disconnect(&id).await.unwrap();
    device.mute(true);

    let connecting = {
        let client = Arc::clone(&client);
        let id = id.clone();
        tokio::spawn(async move { client.connect(&id).await })
    };

    let handshakes = || {
        device
            .commands()
            .iter()
            .filter(|c| c.starts_with("all\t"))
            .count()
    };
    assert!(wait_until(|| handshakes() == 2, DEFAULT_TIMEOUT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.state(&id), ConnectionState::Connecting);

    device.mute(false);
    let snapshot = device.respond("all\t20|").unwrap();
    assert!(link.notify(&id, Channel::Properties, &snapshot));

    connecting.await.unwrap().unwrap();
    assert!(client.is_connected(&id));
}

#[tokio::test]
async fn test_link_loss_after_reconnect_is_reported() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    let disconnected = EventCollector::<DeviceDisconnected>::new();
    let _sub = client.on_device_disconnected(disconnected.callback());

    client.disconnect(&id).await.unwrap();
    client.connect(&id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    link.drop_link(&id);

    assert!(disconnected.wait_for_count(2, DEFAULT_TIMEOUT).await);
    assert!(!disconnected.last().unwrap().was_expected);
    assert!(!client.is_connected(&id));
}

#[tokio::test]
async fn test_unexpected_link_loss() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    let disconnected = EventCollector::<DeviceDisconnected>::new();
    let _sub = client.on_device_disconnected(disconnected.callback());

    link.drop_link(&id);

    assert!(disconnected.wait_for_count(1, DEFAULT_TIMEOUT).await);
    let event = disconnected.last().unwrap();
    assert_eq!(event.device, id);
    assert!(!event.was_expected);

    assert_eq!(client.state(&id), ConnectionState::Disconnected);
    assert_eq!(client.cached(&id, "batterylevel"), None);
    assert!(matches!(
        client.get_property(&id, "batterylevel").await,
        Err(ClientError::NotConnected(_))
    ));
}

#[tokio::test]
async fn test_link_loss_cancels_pending_request() {
    let (client, link, device) = connected_client(WirocBuilder::new()).await;
    let client = Arc::new(client);
    let id = device_id();
    device.mute(true);

    let request = {
        let client = Arc::clone(&client);
        let id = id.clone();
        tokio::spawn(async move { client.refresh_properties(&id, &["batterylevel"]).await })
    };

    assert!(
        wait_until(
            || device.commands().iter().any(|c| c == "batterylevel|"),
            DEFAULT_TIMEOUT
        )
        .await
    );
    link.drop_link(&id);

    let result = request.await.unwrap();
    assert!(matches!(result, Err(ClientError::RequestCancelled)));
}

#[tokio::test]
async fn test_reconnect_after_link_loss() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();

    link.drop_link(&id);
    assert!(wait_until(|| !client.is_connected(&id), DEFAULT_TIMEOUT).await);

    client.connect(&id).await.unwrap();
    assert!(client.is_connected(&id));
    assert_eq!(
        client.get_property(&id, "batterylevel").await.unwrap(),
        PropertyValue::Int(87)
    );
}

// ============================================================================
// Property Operations
// ============================================================================

#[tokio::test]
async fn test_cached_get_does_not_touch_the_link() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let writes_before = link.writes().len();

    let level = client
        .get_property(&device_id(), "batterylevel")
        .await
        .unwrap();

    assert_eq!(level, PropertyValue::Int(87));
    assert_eq!(link.writes().len(), writes_before);
}

#[tokio::test]
async fn test_set_channel_end_to_end() {
    let (client, link, device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();

    let confirmed = client.set_property(&id, "channel", "3").await.unwrap();

    assert_eq!(confirmed, PropertyValue::Int(3));
    assert_eq!(
        link.payloads(Channel::Properties).last().map(String::as_str),
        Some("channel\t3")
    );
    assert_eq!(device.wire("channel").as_deref(), Some("3"));
    assert_eq!(client.cached(&id, "channel"), Some(PropertyValue::Int(3)));
}

#[tokio::test]
async fn test_set_typed_values() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();

    let enabled = client.set_property(&id, "srr/enabled", true).await.unwrap();
    assert_eq!(enabled, PropertyValue::Bool(true));

    let mode = client
        .set_property(&id, "loramode", PropertyValue::Enum("REPEATER".into()))
        .await
        .unwrap();
    assert_eq!(mode, PropertyValue::Enum("REPEATER".into()));

    let payloads = link.payloads(Channel::Properties);
    assert!(payloads.contains(&"srr/enabled\t1".to_string()));
    assert!(payloads.contains(&"loramode\trepeater".to_string()));
}

#[tokio::test]
async fn test_invalid_value_is_rejected_before_sending() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let writes_before = link.writes().len();

    let result = client.set_property(&device_id(), "channel", "three").await;
    assert!(matches!(
        result,
        Err(ClientError::Protocol(Error::InvalidValue { .. }))
    ));
    assert_eq!(link.writes().len(), writes_before);
}

#[tokio::test]
async fn test_vocabulary_errors() {
    let (client, _link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();

    assert!(matches!(
        client.get_property(&id, "nosuchthing").await,
        Err(ClientError::Protocol(Error::UnknownProperty(_)))
    ));
    assert!(matches!(
        client.get_property(&id, "renewip").await,
        Err(ClientError::Protocol(Error::NotGettable(_)))
    ));
    assert!(matches!(
        client.set_property(&id, "batterylevel", 10i64).await,
        Err(ClientError::Protocol(Error::NotSettable(_)))
    ));
}

#[tokio::test]
async fn test_get_requires_connection() {
    let (link, _device) = setup();
    let client = WirocClient::new(link).unwrap();

    assert!(matches!(
        client.get_property(&device_id(), "batterylevel").await,
        Err(ClientError::NotConnected(_))
    ));
}

#[tokio::test]
async fn test_empty_requests_are_rejected() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let writes_before = link.writes().len();
    let none: [&str; 0] = [];

    assert!(matches!(
        client.refresh_properties(&device_id(), &none).await,
        Err(ClientError::Protocol(Error::EmptyCommand))
    ));
    assert!(matches!(
        client.send_data(&device_id(), "").await,
        Err(ClientError::Protocol(Error::EmptyCommand))
    ));
    assert_eq!(link.writes().len(), writes_before);
}

#[tokio::test]
async fn test_missing_property_in_response() {
    let (client, _link, device) = connected_client(WirocBuilder::new()).await;
    device.remove("status");

    let result = client.get_property(&device_id(), "status").await;
    assert!(matches!(
        result,
        Err(ClientError::Protocol(Error::PropertyMissing(name))) if name == "status"
    ));
}

#[tokio::test]
async fn test_json_and_record_properties() {
    let (client, _link, device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    device.set_wire(
        "status",
        r#"{"components":[{"name":"lora","status":"ok"}]}"#,
    );
    device.set_wire("listwifi", "home,yes,78;office,no,40");

    let status = client.get_property(&id, "status").await.unwrap();
    assert_eq!(status.as_json().unwrap()["components"][0]["status"], "ok");

    let networks = client.get_property(&id, "listwifi").await.unwrap();
    let networks = networks.as_records().unwrap();
    assert_eq!(networks.len(), 2);
    assert_eq!(networks[1]["network"], "office");
}

#[tokio::test]
async fn test_refresh_bypasses_cache() {
    let (client, link, device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    device.set_wire("batterylevel", "42");

    assert_eq!(client.cached(&id, "batterylevel"), Some(PropertyValue::Int(87)));

    let values = client
        .refresh_properties(&id, &["batterylevel", "ischarging"])
        .await
        .unwrap();

    assert_eq!(values["batterylevel"], PropertyValue::Int(42));
    assert_eq!(values["ischarging"], PropertyValue::Bool(false));
    assert_eq!(client.cached(&id, "batterylevel"), Some(PropertyValue::Int(42)));
    assert_eq!(
        link.payloads(Channel::Properties).last().map(String::as_str),
        Some("batterylevel|ischarging|")
    );
}

#[tokio::test]
async fn test_command_confirmations_update_target() {
    let (client, _link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();

    let ip = client.set_property(&id, "renewip", true).await.unwrap();
    assert_eq!(ip, PropertyValue::Text("192.168.1.44".into()));

    let settings = client
        .set_property(
            &id,
            "setting",
            record(&[("key", "sendtoblenabled"), ("value", "1")]),
        )
        .await
        .unwrap();
    let settings = settings.as_records().unwrap();
    assert_eq!(settings.len(), 2);
    assert_eq!(settings[1]["key"], "sendtoblenabled");

    let cached = client.cached(&id, "settings").unwrap();
    assert_eq!(cached.as_records().unwrap().len(), 2);
    assert_eq!(client.cached(&id, "setting"), None);
}

#[tokio::test]
async fn test_raw_send_data() {
    let (client, _link, _device) = connected_client(WirocBuilder::new()).await;

    let reply = client
        .send_data(&device_id(), "lorapower|")
        .await
        .unwrap();
    assert_eq!(reply, "lorapower\t14");
}

#[tokio::test]
async fn test_command_on_chunk_boundary_is_padded() {
    let (client, link, device) = connected_client(WirocBuilder::new()).await;

    // 16 + 24 bytes, exactly two chunks
    let command = format!("wirocdevicename\t{}", "y".repeat(24));
    assert_eq!(command.len(), 40);

    let reply = client.send_data(&device_id(), &command).await.unwrap();

    let last = link.payloads(Channel::Properties).pop().unwrap();
    assert_eq!(last, format!("{} ", command));
    assert_eq!(device.commands().last(), Some(&command));
    assert_eq!(reply.trim_end(), command);
}

// ============================================================================
// Request Serialization
// ============================================================================

#[tokio::test]
async fn test_back_to_back_requests_are_matched() {
    let (client, _link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();

    let (battery, power) = tokio::join!(
        client.refresh_properties(&id, &["batterylevel"]),
        client.refresh_properties(&id, &["lorapower"]),
    );

    let battery = battery.unwrap();
    let power = power.unwrap();
    assert_eq!(battery.len(), 1);
    assert_eq!(battery["batterylevel"], PropertyValue::Int(87));
    assert_eq!(power.len(), 1);
    assert_eq!(power["lorapower"], PropertyValue::Int(14));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_requests() {
    let (client, _link, _device) = connected_client(WirocBuilder::new()).await;
    let client = Arc::new(client);
    let id = device_id();

    let mut handles = Vec::new();
    for i in 0..12 {
        let client = Arc::clone(&client);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let name = if i % 2 == 0 { "lorapower" } else { "channel" };
            let values = client.refresh_properties(&id, &[name]).await.unwrap();
            (name, values)
        }));
    }

    for handle in handles {
        let (name, values) = handle.await.unwrap();
        assert_eq!(values.len(), 1, "response for {} carried {:?}", name, values);
        assert!(values.contains_key(name));
    }
}

#[tokio::test]
async fn test_write_failure_releases_the_slot() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();

    link.fail_writes(Some(TransportError::SendFailed("radio busy".into())));
    let result = client.set_property(&id, "channel", "5").await;
    assert!(matches!(
        result,
        Err(ClientError::Transport(TransportError::SendFailed(_)))
    ));

    link.fail_writes(None);
    let confirmed = client.set_property(&id, "channel", "5").await.unwrap();
    assert_eq!(confirmed, PropertyValue::Int(5));
}

#[tokio::test]
async fn test_request_timeout() {
    let (client, _link, device) =
        connected_client(WirocBuilder::new().request_timeout(Duration::from_millis(50))).await;
    device.mute(true);

    let result = client.refresh_properties(&device_id(), &["batterylevel"]).await;
    assert!(matches!(result, Err(ClientError::Timeout)));

    device.mute(false);
    let values = client
        .refresh_properties(&device_id(), &["batterylevel"])
        .await
        .unwrap();
    assert_eq!(values["batterylevel"], PropertyValue::Int(87));
}

#[tokio::test]
async fn test_late_reply_is_not_handed_to_next_request() {
    let (client, link, device) =
        connected_client(WirocBuilder::new().request_timeout(Duration::from_millis(200))).await;
    let id = device_id();
    device.mute(true);

    let result = client.refresh_properties(&id, &["batterylevel"]).await;
    assert!(matches!(result, Err(ClientError::Timeout)));

    // The answer to the abandoned query shows up after all
    device.mute(false);
    assert!(link.notify(&id, Channel::Properties, "batterylevel\t61"));

    let values = client.refresh_properties(&id, &["lorapower"]).await.unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values["lorapower"], PropertyValue::Int(14));
    assert_eq!(client.cached(&id, "batterylevel"), Some(PropertyValue::Int(61)));
}

// ============================================================================
// Unsolicited Property Messages
// ============================================================================

#[tokio::test]
async fn test_unsolicited_push_updates_cache() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    let changes = EventCollector::<PropertiesChanged>::new();
    let _sub = client.on_properties_changed(changes.callback());

    assert!(link.notify(&id, Channel::Properties, "batterylevel\t55|ischarging\t1"));

    assert!(changes.wait_for_count(1, DEFAULT_TIMEOUT).await);
    let change = changes.last().unwrap();
    assert_eq!(change.device, id);
    assert_eq!(change.properties.len(), 2);
    assert_eq!(client.cached(&id, "batterylevel"), Some(PropertyValue::Int(55)));
    assert_eq!(client.cached(&id, "ischarging"), Some(PropertyValue::Bool(true)));
}

#[tokio::test]
async fn test_malformed_push_is_dropped() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    let changes = EventCollector::<PropertiesChanged>::new();
    let _sub = client.on_properties_changed(changes.callback());

    link.notify(&id, Channel::Properties, "batterylevel\tlots");
    link.notify(&id, Channel::Properties, "lorapower\t20");

    assert!(changes.wait_for_count(1, DEFAULT_TIMEOUT).await);
    assert_eq!(changes.count(), 1);
    assert_eq!(client.cached(&id, "batterylevel"), Some(PropertyValue::Int(87)));
    assert_eq!(client.cached(&id, "lorapower"), Some(PropertyValue::Int(20)));
}

#[tokio::test]
async fn test_dropped_subscription_stops_callbacks() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    let changes = EventCollector::<PropertiesChanged>::new();
    let sub = client.on_properties_changed(changes.callback());

    link.notify(&id, Channel::Properties, "batterylevel\t50");
    assert!(changes.wait_for_count(1, DEFAULT_TIMEOUT).await);

    drop(sub);
    link.notify(&id, Channel::Properties, "batterylevel\t49");
    assert!(
        wait_until(
            || client.cached(&id, "batterylevel") == Some(PropertyValue::Int(49)),
            DEFAULT_TIMEOUT
        )
        .await
    );
    assert_eq!(changes.count(), 1);
}

// ============================================================================
// Streams
// ============================================================================

const PUNCHES: &str = r#"{"punches":[{"sinumber":8154321,"stationnumber":31,"timestamp":"2024-05-11T10:15:02.125"},{"sinumber":8154322,"stationnumber":32,"timestamp":"2024-05-11T10:15:09.500"}]}"#;

#[tokio::test]
async fn test_punch_stream() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    let batches = EventCollector::<PunchBatch>::new();
    let _sub = client.on_punches_received(batches.callback());

    client.enable_punches_notification(&id).await.unwrap();
    client.enable_punches_notification(&id).await.unwrap();
    assert!(link.is_monitoring(&id, Channel::Punches));

    assert!(link.notify(&id, Channel::Punches, PUNCHES));
    assert!(batches.wait_for_count(1, DEFAULT_TIMEOUT).await);

    let batch = batches.last().unwrap();
    assert_eq!(batch.device, id);
    assert_eq!(batch.punches.len(), 2);
    assert_eq!(batch.punches[1].sinumber, 8154322);
}

#[tokio::test]
async fn test_malformed_punch_batch_is_dropped() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    let batches = EventCollector::<PunchBatch>::new();
    let _sub = client.on_punches_received(batches.callback());

    client.enable_punches_notification(&id).await.unwrap();
    link.notify(&id, Channel::Punches, r#"{"punches":[{"sinumber":"#);
    link.notify(&id, Channel::Punches, PUNCHES);

    assert!(batches.wait_for_count(1, DEFAULT_TIMEOUT).await);
    assert_eq!(batches.last().unwrap().punches.len(), 2);
}

#[tokio::test]
async fn test_disable_is_idempotent() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();

    client.enable_punches_notification(&id).await.unwrap();
    client.disable_punches_notification(&id).await.unwrap();
    client.disable_punches_notification(&id).await.unwrap();

    assert!(!link.is_monitoring(&id, Channel::Punches));
    assert_eq!(link.cancelled(), vec![(id.clone(), Channel::Punches)]);

    // Disabling after the link is gone is not an error either
    link.drop_link(&id);
    client.disable_test_punches_notification(&id).await.unwrap();
}

#[tokio::test]
async fn test_enable_requires_connection() {
    let (link, _device) = setup();
    let client = WirocClient::new(link).unwrap();
    assert!(matches!(
        client.enable_punches_notification(&device_id()).await,
        Err(ClientError::NotConnected(_))
    ));
}

#[tokio::test]
async fn test_test_punch_stream() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    let batches = EventCollector::<TestPunchBatch>::new();
    let _sub = client.on_test_punches_sent(batches.callback());

    client.enable_test_punches_notification(&id).await.unwrap();

    let started = client
        .set_property(
            &id,
            "starttestpunches",
            record(&[("count", "2"), ("interval", "1"), ("synchronized", "0")]),
        )
        .await
        .unwrap();
    assert_eq!(started, PropertyValue::Text("OK".into()));
    assert_eq!(
        link.payloads(Channel::Properties).last().map(String::as_str),
        Some("starttestpunches\t2\t1\t0")
    );

    link.notify(
        &id,
        Channel::TestPunches,
        r#"{"punches":[{"id":1,"sinumber":16,"stationnumber":100,"timestamp":"2024-05-11T10:00:00","status":"acked","noofsendtries":1}]}"#,
    );

    assert!(batches.wait_for_count(1, DEFAULT_TIMEOUT).await);
    let batch = batches.last().unwrap();
    assert_eq!(batch.punches[0].id, 1);
    assert_eq!(batch.punches[0].status, TestPunchStatus::Acked);
}

#[tokio::test]
async fn test_streams_are_independent() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();
    let punches = EventCollector::<PunchBatch>::new();
    let tests = EventCollector::<TestPunchBatch>::new();
    let _a = client.on_punches_received(punches.callback());
    let _b = client.on_test_punches_sent(tests.callback());

    client.enable_punches_notification(&id).await.unwrap();
    client.enable_test_punches_notification(&id).await.unwrap();

    // Interleave chunks of two messages on different channels
    let long = PUNCHES.as_bytes();
    link.push_chunk(&id, Channel::Punches, &long[..20]);
    link.push_chunk(&id, Channel::TestPunches, br#"{"punches":[]}"#);
    link.notify(&id, Channel::Punches, std::str::from_utf8(&long[20..]).unwrap());

    assert!(tests.wait_for_count(1, DEFAULT_TIMEOUT).await);
    assert!(punches.wait_for_count(1, DEFAULT_TIMEOUT).await);
    assert_eq!(punches.last().unwrap().punches.len(), 2);
    assert!(tests.last().unwrap().punches.is_empty());
}

#[tokio::test]
async fn test_link_loss_tears_down_streams() {
    let (client, link, _device) = connected_client(WirocBuilder::new()).await;
    let id = device_id();

    client.enable_punches_notification(&id).await.unwrap();
    link.drop_link(&id);
    assert!(wait_until(|| !client.is_connected(&id), DEFAULT_TIMEOUT).await);

    assert!(!link.is_monitoring(&id, Channel::Punches));
    assert!(!link.is_monitoring(&id, Channel::Properties));
}
