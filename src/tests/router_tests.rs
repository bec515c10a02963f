use super::fake_device::{entry, FakeDevice, Slot};
use crate::model::{PortMapping, Protocol};
use crate::router::device_router::collect_port_mappings;
use crate::router::{DeviceRouter, Router};
use std::error::Error as _;
use std::net::TcpListener;
use std::time::Duration;

/// Helper to create a router around a fake device
fn create_test_router(device: FakeDevice) -> DeviceRouter<FakeDevice> {
    DeviceRouter::new(device).with_probe_timeout(Duration::from_millis(500))
}

fn mapping(protocol: Protocol, external_port: u16, client: &str, internal_port: u16) -> PortMapping {
    PortMapping::new(protocol, None, external_port, client, internal_port, "test")
}

// ========================================================================
// Enumeration
// ========================================================================

#[test]
fn test_port_mappings_skips_empty_and_stops_at_failure() {
    let device = FakeDevice::new("Gateway").with_slots(vec![
        entry("TCP", 1000, "192.168.1.10", 1000),
        entry("UDP", 1001, "192.168.1.11", 1001),
        Slot::Empty,
        entry("TCP", 1003, "192.168.1.13", 1003),
    ]);
    let router = create_test_router(device);

    let mappings = router.port_mappings().expect("Failed to enumerate");

    let ports: Vec<u16> = mappings.iter().map(|m| m.external_port()).collect();
    assert_eq!(ports, vec![1000, 1001, 1003]);

    let device = router.device().expect("Router should be connected");
    assert_eq!(*device.requested_indices.borrow(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_port_mappings_empty_table() {
    let router = create_test_router(FakeDevice::new("Gateway"));

    let mappings = router.port_mappings().expect("End of list is not an error");
    assert!(mappings.is_empty());
}

#[test]
fn test_port_mappings_restart_from_zero() {
    let device = FakeDevice::new("Gateway").with_slots(vec![
        entry("TCP", 80, "192.168.1.10", 8080),
        entry("UDP", 53, "192.168.1.2", 53),
    ]);
    let router = create_test_router(device);

    let first = router.port_mappings().expect("Failed to enumerate");
    let second = router.port_mappings().expect("Failed to enumerate");
    assert_eq!(first, second);

    let device = router.device().expect("Router should be connected");
    assert_eq!(*device.requested_indices.borrow(), vec![0, 1, 2, 0, 1, 2]);
}

#[test]
fn test_port_mappings_stop_after_last_index() {
    let device = FakeDevice::new("Gateway").answering_every_index();

    let mappings = collect_port_mappings(&device, u32::MAX - 2..=u32::MAX);

    assert!(mappings.is_empty());
    assert_eq!(
        *device.requested_indices.borrow(),
        vec![u32::MAX - 2, u32::MAX - 1, u32::MAX]
    );
}

#[test]
fn test_port_mappings_normalize_protocol() {
    let device = FakeDevice::new("Gateway").with_slots(vec![
        entry("tcp", 1, "192.168.1.10", 1),
        entry("Udp", 2, "192.168.1.10", 2),
        entry("bogus", 3, "192.168.1.10", 3),
    ]);
    let router = create_test_router(device);

    let protocols: Vec<Protocol> = router
        .port_mappings()
        .expect("Failed to enumerate")
        .iter()
        .map(|m| m.protocol())
        .collect();
    assert_eq!(protocols, vec![Protocol::Tcp, Protocol::Udp, Protocol::Udp]);
}

#[test]
fn test_port_mappings_carry_entry_fields() {
    let device = FakeDevice::new("Gateway").with_slots(vec![entry("TCP", 443, "192.168.1.50", 8443)]);
    let router = create_test_router(device);

    let mappings = router.port_mappings().expect("Failed to enumerate");
    assert_eq!(mappings.len(), 1);
    let m = &mappings[0];
    assert_eq!(m.remote_host(), None);
    assert_eq!(m.remote_host_display(), "");
    assert_eq!(m.internal_client(), "192.168.1.50");
    assert_eq!(m.internal_port(), 8443);
    assert_eq!(m.description(), "mapping 443");
}

// ========================================================================
// Add / remove
// ========================================================================

#[test]
fn test_add_then_remove_with_different_internal_side() {
    let router = create_test_router(FakeDevice::new("Gateway"));

    let added = PortMapping::new(Protocol::Tcp, None, 2222, "192.168.1.10", 22, "ssh");
    router.add_port_mapping(&added).expect("Failed to add mapping");
    assert_eq!(router.port_mappings().expect("Failed to enumerate"), vec![added]);

    let same_key = PortMapping::new(Protocol::Tcp, None, 2222, "10.0.0.99", 9999, "something else");
    router.remove_mapping(&same_key).expect("Removal should match on key only");

    assert!(router.port_mappings().expect("Failed to enumerate").is_empty());
}

#[test]
fn test_remove_unknown_mapping_fails() {
    let router = create_test_router(FakeDevice::new("Gateway"));

    let err = router
        .remove_port_mapping(Protocol::Udp, None, 9999)
        .expect_err("Removing a missing mapping should fail");
    assert!(err.message().contains("9999"));
    assert!(err.source().is_some(), "Device error should be the cause");
}

#[test]
fn test_add_port_mappings_stops_at_first_failure() {
    let router = create_test_router(FakeDevice::new("Gateway").failing_add_port(2));

    let mappings = vec![
        mapping(Protocol::Tcp, 1, "192.168.1.10", 1),
        mapping(Protocol::Tcp, 2, "192.168.1.10", 2),
        mapping(Protocol::Tcp, 3, "192.168.1.10", 3),
    ];
    let err = router
        .add_port_mappings(&mappings)
        .expect_err("Second mapping should fail");
    assert!(err.message().contains("Could not add port mapping"));
    assert!(err.source().is_some());

    let device = router.device().expect("Router should be connected");
    assert_eq!(*device.calls.borrow(), vec!["add TCP 1", "add TCP 2"]);

    let ports: Vec<u16> = router
        .port_mappings()
        .expect("Failed to enumerate")
        .iter()
        .map(|m| m.external_port())
        .collect();
    assert_eq!(ports, vec![1]);
}

#[test]
fn test_add_port_mappings_applies_all_in_order() {
    let router = create_test_router(FakeDevice::new("Gateway"));

    let mappings = vec![
        mapping(Protocol::Udp, 10, "192.168.1.10", 10),
        mapping(Protocol::Tcp, 20, "192.168.1.10", 20),
    ];
    router.add_port_mappings(&mappings).expect("Failed to add mappings");

    assert_eq!(router.port_mappings().expect("Failed to enumerate"), mappings);
}

// ========================================================================
// External IP
// ========================================================================

#[test]
fn test_external_ip_address() {
    let router = create_test_router(FakeDevice::new("Gateway").with_external_ip("203.0.113.10"));
    assert_eq!(router.external_ip_address().expect("Failed to get IP"), "203.0.113.10");
}

#[test]
fn test_external_ip_address_failure_is_wrapped() {
    let router = create_test_router(FakeDevice::new("Gateway"));

    let err = router.external_ip_address().expect_err("Device has no WAN connection");
    assert!(err.message().contains("Gateway"));
    assert!(err.source().is_some());
}

// ========================================================================
// Internal host and port
// ========================================================================

#[test]
fn test_internal_port_from_presentation_url() {
    let device = FakeDevice::new("Gateway").with_urls(
        Some("http://192.168.1.1:49000/"),
        Some("http://192.168.1.1:5000/"),
    );
    let router = create_test_router(device);
    assert_eq!(router.internal_port().expect("Failed to get port"), 49000);
}

#[test]
fn test_internal_port_falls_back_to_url_base() {
    let device = FakeDevice::new("Gateway").with_urls(None, Some("http://192.168.1.1:5000/"));
    let router = create_test_router(device);
    assert_eq!(router.internal_port().expect("Failed to get port"), 5000);
}

#[test]
fn test_internal_port_without_explicit_port_is_zero() {
    let device = FakeDevice::new("Gateway").with_urls(Some("http://192.168.1.1/"), None);
    let router = create_test_router(device);
    assert_eq!(router.internal_port().expect("Failed to get port"), 0);
}

#[test]
fn test_internal_port_without_urls_fails() {
    let router = create_test_router(FakeDevice::new("Gateway").with_urls(None, None));

    let err = router.internal_port().expect_err("No URL is advertised");
    assert!(err.message().contains("Presentation URL and URL base"));
}

#[test]
fn test_internal_port_with_malformed_url_fails() {
    let router = create_test_router(FakeDevice::new("Gateway").with_urls(None, Some("not a url")));

    let err = router.internal_port().expect_err("URL base is malformed");
    assert!(err.message().contains("not a url"));
    assert!(err.source().is_some());
}

#[test]
fn test_internal_host_name() {
    let router = create_test_router(FakeDevice::new("Gateway"));
    assert_eq!(router.internal_host_name().as_deref(), Some("192.168.1.1"));

    let router = create_test_router(FakeDevice::new("Gateway").with_urls(Some("  "), None));
    assert_eq!(router.internal_host_name(), None);

    let router = create_test_router(FakeDevice::new("Gateway").with_urls(Some("fritz.box"), None));
    assert_eq!(router.internal_host_name().as_deref(), Some("fritz.box"));
}

#[test]
fn test_router_display() {
    let router = create_test_router(FakeDevice::new("FRITZ!Box 7590"));
    assert_eq!(router.to_string(), "FRITZ!Box 7590 (192.168.1.1)");

    let boxed: Box<dyn Router> = Box::new(create_test_router(
        FakeDevice::new("Gateway").with_urls(None, None),
    ));
    assert_eq!(boxed.to_string(), "Gateway ()");
}

// ========================================================================
// Local host address
// ========================================================================

#[test]
fn test_local_host_address_rejects_loopback() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let port = listener.local_addr().expect("No local address").port();
    let url = format!("http://127.0.0.1:{}/", port);
    let router = create_test_router(FakeDevice::new("Gateway").with_urls(Some(url.as_str()), None));

    let err = router
        .local_host_address()
        .expect_err("Loopback address must be rejected");
    assert!(err.message().contains("127."));
}

#[test]
fn test_local_host_address_unresolvable_host_is_fatal() {
    let device = FakeDevice::new("Gateway").with_urls(Some("http://gateway.invalid:5000/"), None);
    let router = create_test_router(device);

    let err = router
        .local_host_address()
        .expect_err("Host resolution failure must be reported");
    assert!(err.message().contains("gateway.invalid:5000"));
}

/// Result of the default route lookup, as a router without URLs reports it
fn default_route_result() -> Result<String, String> {
    create_test_router(FakeDevice::new("Gateway").with_urls(None, None))
        .local_host_address()
        .map_err(|e| e.message().to_string())
}

#[test]
fn test_local_host_address_falls_back_when_router_unreachable() {
    // Nothing listens on the port once the listener is dropped
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        listener.local_addr().expect("No local address").port()
    };
    let url = format!("http://127.0.0.1:{}/", port);
    let router = create_test_router(FakeDevice::new("Gateway").with_urls(Some(url.as_str()), None));

    let address = router
        .local_host_address()
        .map_err(|e| e.message().to_string());
    assert_eq!(address, default_route_result());
}

#[test]
fn test_local_host_address_without_explicit_port_uses_default_route() {
    let router = create_test_router(FakeDevice::new("Gateway").with_urls(Some("http://127.0.0.1/"), None));

    let address = router
        .local_host_address()
        .map_err(|e| e.message().to_string());
    assert_eq!(address, default_route_result());
}


// ========================================================================
// Lifecycle and diagnostics
// ========================================================================

#[test]
fn test_disconnect_is_idempotent() {
    let mut router = create_test_router(FakeDevice::new("Gateway"));

    router.disconnect();
    router.disconnect();

    assert!(router.is_disconnected());
    assert_eq!(router.name(), "Gateway");
    assert_eq!(router.internal_host_name(), None);
}

#[test]
fn test_operations_fail_after_disconnect() {
    let mut router = create_test_router(FakeDevice::new("Gateway").with_external_ip("203.0.113.10"));
    router.disconnect();

    assert!(router.port_mappings().is_err());
    assert!(router.external_ip_address().is_err());
    assert!(router.internal_port().is_err());
    let err = router
        .add_port_mapping(&mapping(Protocol::Tcp, 1, "192.168.1.10", 1))
        .expect_err("Router is disconnected");
    assert!(err.message().contains("disconnected"));
}

#[test]
fn test_log_router_info_does_not_touch_device_state() {
    let router = create_test_router(FakeDevice::new("Gateway"));
    router.log_router_info();

    let device = router.device().expect("Router should be connected");
    assert!(device.calls.borrow().is_empty());
    assert!(device.requested_indices.borrow().is_empty());
}
