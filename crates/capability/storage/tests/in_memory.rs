use domain::{Fix, Protocol};
use geotrack_storage::{
    DeviceRecord, DeviceRegistry, InMemoryDeviceRegistry, InMemoryPositionSink, PositionSink,
    has_test_prefix,
};

#[tokio::test]
async fn registry_finds_registered_device() {
    let registry = InMemoryDeviceRegistry::new();
    registry.register(DeviceRecord::new("0353419021776610", "tracker-1"));

    let record = registry
        .find_by_unique_id("0353419021776610")
        .await
        .expect("query")
        .expect("record");
    assert_eq!(record.unique_id, "0353419021776610");
    assert_eq!(record.status, "active");

    let missing = registry
        .find_by_unique_id("does-not-exist")
        .await
        .expect("query");
    assert!(missing.is_none());
}

#[tokio::test]
async fn sink_keeps_arrival_order() {
    let sink = InMemoryPositionSink::new();
    for i in 0..3 {
        let fix = Fix::new(Protocol::Teltonika, f64::from(i), 0.0);
        sink.publish(fix.into_position("dev-1")).await.expect("publish");
    }

    let positions = sink.positions();
    assert_eq!(positions.len(), 3);
    assert_eq!(positions[0].latitude, 0.0);
    assert_eq!(positions[2].latitude, 2.0);
}

#[test]
fn test_prefixes_are_recognized() {
    assert!(has_test_prefix("test-001"));
    assert!(has_test_prefix("demo-2"));
    assert!(!has_test_prefix("0353419021776610"));

    let record = DeviceRecord::test_device("test-001", "h02");
    assert!(record.is_test_device());
    assert_eq!(record.protocol.as_deref(), Some("h02"));
}
