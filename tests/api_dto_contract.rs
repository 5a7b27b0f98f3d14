//! JSON shape contract for the wire DTOs device agents exchange with the
//! control plane. No live store/cache needed — these are pure serde
//! round-trips.

use meshctl::api::device::{ConfigQuery, RegisterRequest, SessionStartRequest, SessionUpdateRequest};
use meshctl::store::models::{ConnectionType, NatType};
use meshctl::topology::{InterfaceView, PeerView, TunnelConfig};
use uuid::Uuid;

#[test]
fn register_request_parses_the_documented_field_names() {
    let network_id = Uuid::new_v4();
    let body = serde_json::json!({
        "pre_shared_key": "11111111-1111-1111-1111-111111111111.secret",
        "public_key": "base64-encoded-key==",
        "platform": "linux",
        "device_name": "laptop",
        "virtual_network_id": network_id,
    });
    let req: RegisterRequest = serde_json::from_value(body).expect("valid register request");
    assert_eq!(req.platform, "linux");
    assert_eq!(req.virtual_network_id, network_id);
}

#[test]
fn config_query_defaults_listen_port_when_absent() {
    let query: ConfigQuery = serde_json::from_value(serde_json::json!({})).expect("valid config query");
    assert_eq!(query.listen_port, 51820);
}

#[test]
fn config_query_honors_an_explicit_listen_port() {
    let query: ConfigQuery = serde_json::from_value(serde_json::json!({ "listen_port": 443 })).expect("valid config query");
    assert_eq!(query.listen_port, 443);
}

#[test]
fn session_start_request_parses_connection_type_as_snake_case() {
    let req: SessionStartRequest = serde_json::from_value(serde_json::json!({
        "peer_device_id": Uuid::new_v4(),
        "connection_type": "turn_relay",
    }))
    .expect("valid session start request");
    assert_eq!(req.connection_type, ConnectionType::TurnRelay);
}

#[test]
fn session_update_request_allows_omitted_latency() {
    let req: SessionUpdateRequest = serde_json::from_value(serde_json::json!({
        "bytes_sent": 100,
        "bytes_received": 200,
    }))
    .expect("valid session update request");
    assert_eq!(req.latency_ms, None);
}

#[test]
fn tunnel_config_serializes_the_documented_shape() {
    let config = TunnelConfig {
        interface: InterfaceView {
            address: "10.10.0.2/24".to_string(),
            listen_port: 51820,
            dns: vec!["10.10.0.1".to_string()],
        },
        peers: vec![PeerView {
            public_key: "peer-key".to_string(),
            allowed_ips: vec!["10.10.0.3/32".to_string()],
            endpoint: Some("203.0.113.5:51820".to_string()),
            persistent_keepalive: Some(25),
        }],
    };
    let value = serde_json::to_value(&config).unwrap();
    assert_eq!(value["interface"]["address"], "10.10.0.2/24");
    assert_eq!(value["peers"][0]["public_key"], "peer-key");
    assert_eq!(value["peers"][0]["persistent_keepalive"], 25);
}

#[test]
fn nat_type_parses_the_documented_variant_names() {
    let value: NatType = serde_json::from_value(serde_json::json!("port_restricted_cone")).unwrap();
    assert_eq!(value, NatType::PortRestrictedCone);
}
