//! Subscription matching and outbound frame shaping. Pure logic, no
//! network or broker needed.

use meshctl::eventbus::client::{OutboundFrame, Subscription};
use meshctl::eventbus::{Event, EventType};
use uuid::Uuid;

#[test]
fn wildcard_subscription_matches_any_device_and_org() {
    let sub = Subscription { event_type: EventType::DeviceStatus, device_id: None, org_id: None };
    let event = Event::device_status(Uuid::new_v4(), true);
    assert!(sub.matches(&event));
}

#[test]
fn scoped_subscription_requires_matching_device() {
    let device_id = Uuid::new_v4();
    let sub = Subscription { event_type: EventType::DeviceStatus, device_id: Some(device_id), org_id: None };

    assert!(sub.matches(&Event::device_status(device_id, true)));
    assert!(!sub.matches(&Event::device_status(Uuid::new_v4(), true)));
}

#[test]
fn scoped_subscription_requires_matching_org() {
    let org_id = Uuid::new_v4();
    let sub = Subscription { event_type: EventType::AlertCreated, device_id: None, org_id: Some(org_id) };

    let matching = Event::alert_created(org_id, None, serde_json::json!({}));
    let other = Event::alert_created(Uuid::new_v4(), None, serde_json::json!({}));
    assert!(sub.matches(&matching));
    assert!(!sub.matches(&other));
}

#[test]
fn subscription_never_matches_a_different_event_type() {
    let sub = Subscription { event_type: EventType::MetricsUpdate, device_id: None, org_id: None };
    let event = Event::session_update(Uuid::new_v4(), serde_json::json!({}));
    assert!(!sub.matches(&event));
}

#[test]
fn outbound_frame_carries_the_event_type_tag_and_payload() {
    let device_id = Uuid::new_v4();
    let event = Event::metrics_update(device_id, serde_json::json!({ "rtt_ms": 12 }));
    let frame = OutboundFrame::from_event(&event);
    assert_eq!(frame.frame_type, "metrics_update");
    assert_eq!(frame.data, serde_json::json!({ "rtt_ms": 12 }));
}

#[test]
fn event_type_serializes_as_snake_case() {
    assert_eq!(serde_json::to_string(&EventType::AlertUpdated).unwrap(), "\"alert_updated\"");
    assert_eq!(serde_json::to_string(&EventType::SessionUpdate).unwrap(), "\"session_update\"");
}

#[test]
fn event_type_round_trips_through_json() {
    for et in [
        EventType::DeviceStatus,
        EventType::AlertCreated,
        EventType::AlertUpdated,
        EventType::MetricsUpdate,
        EventType::SessionUpdate,
    ] {
        let json = serde_json::to_string(&et).unwrap();
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, et);
    }
}
