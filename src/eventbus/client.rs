//! Per-connection client state, subscription matching, and the
//! reader/writer halves of a WebSocket event stream.

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Event, EventBus, EventType};

pub type ClientId = Uuid;

/// Outbound send buffer depth; beyond this a client is considered slow
/// and new events are dropped for it rather than backing up the fan-out
/// loop.
const CLIENT_BUFFER_SIZE: usize = 64;

const READ_DEADLINE: Duration = Duration::from_secs(60);
const WRITE_DEADLINE: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const STALE_AFTER: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub event_type: EventType,
    pub device_id: Option<Uuid>,
    pub org_id: Option<Uuid>,
}

impl Subscription {
    pub fn matches(&self, event: &Event) -> bool {
        self.event_type == event.event_type
            && (self.device_id.is_none() || self.device_id == event.device_id)
            && (self.org_id.is_none() || self.org_id == event.org_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub timestamp: i64,
    pub data: serde_json::Value,
}

impl OutboundFrame {
    pub fn from_event(event: &Event) -> Self {
        let frame_type = match event.event_type {
            EventType::DeviceStatus => "device_status",
            EventType::AlertCreated => "alert_created",
            EventType::AlertUpdated => "alert_updated",
            EventType::MetricsUpdate => "metrics_update",
            EventType::SessionUpdate => "session_update",
        };
        Self { frame_type: frame_type.to_string(), timestamp: Utc::now().timestamp(), data: event.data.clone() }
    }

    pub(crate) fn pong() -> Self {
        Self { frame_type: "pong".to_string(), timestamp: Utc::now().timestamp(), data: serde_json::Value::Null }
    }

    pub(crate) fn error(message: &str) -> Self {
        Self {
            frame_type: "error".to_string(),
            timestamp: Utc::now().timestamp(),
            data: serde_json::json!({ "message": message }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundFrame {
    Subscribe { event_types: Vec<EventType>, device_id: Option<Uuid>, org_id: Option<Uuid> },
    Unsubscribe { event_types: Vec<EventType>, device_id: Option<Uuid>, org_id: Option<Uuid> },
    Ping,
}

pub struct ClientHandle {
    pub id: ClientId,
    pub subscriptions: RwLock<Vec<Subscription>>,
    pub sender: mpsc::Sender<OutboundFrame>,
    last_pong_unix: AtomicI64,
    cancel: CancellationToken,
}

impl ClientHandle {
    pub fn touch(&self) {
        self.last_pong_unix.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn is_stale(&self) -> bool {
        let last = self.last_pong_unix.load(Ordering::Relaxed);
        Utc::now().timestamp() - last > STALE_AFTER.as_secs() as i64
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Drives one client's socket for its whole lifetime: registers a handle,
/// spawns reader and writer loops, and unregisters on exit however it
/// happens (client close, idle timeout, or a heartbeat-triggered cancel).
pub async fn handle_connection(bus: EventBus, socket: WebSocket, org_id: Option<Uuid>) {
    let id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(CLIENT_BUFFER_SIZE);
    let cancel = CancellationToken::new();

    let handle = ClientHandle {
        id,
        subscriptions: RwLock::new(Vec::new()),
        sender: tx,
        last_pong_unix: AtomicI64::new(Utc::now().timestamp()),
        cancel: cancel.clone(),
    };
    bus.register_client(handle);
    tracing::debug!(client_id = %id, "event bus client connected");

    let (mut write, mut read) = socket.split();

    let writer_cancel = cancel.clone();
    let writer = async move {
        let mut ping_ticker = tokio::time::interval(PING_INTERVAL);
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                _ = ping_ticker.tick() => {
                    if tokio::time::timeout(WRITE_DEADLINE, write.send(Message::Ping(Vec::new()))).await.is_err() {
                        break;
                    }
                }
                frame = rx.recv() => {
                    match frame {
                        Some(frame) => {
                            let Ok(text) = serde_json::to_string(&frame) else { continue };
                            if tokio::time::timeout(WRITE_DEADLINE, write.send(Message::Text(text))).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    };

    let reader_bus = bus.clone();
    let reader_cancel = cancel.clone();
    let reader = async move {
        loop {
            let next = tokio::time::timeout(READ_DEADLINE, read.next()).await;
            let Ok(Some(Ok(msg))) = next else { break };
            match msg {
                Message::Pong(_) => {
                    reader_bus.touch_client(id);
                }
                Message::Text(text) => {
                    handle_inbound_frame(&reader_bus, id, org_id, &text);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
        _ = cancel.cancelled() => {},
    }

    reader_cancel.cancel();
    bus.unregister_client(id);
    tracing::debug!(client_id = %id, "event bus client disconnected");
}

fn handle_inbound_frame(bus: &EventBus, id: ClientId, org_id: Option<Uuid>, text: &str) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            bus.send_error(id, &format!("bad frame: {e}"));
            return;
        }
    };
    match frame {
        InboundFrame::Subscribe { event_types, device_id, org_id: req_org } => {
            let scoped_org = req_org.or(org_id);
            for event_type in event_types {
                bus.add_subscription(id, Subscription { event_type, device_id, org_id: scoped_org });
            }
        }
        InboundFrame::Unsubscribe { event_types, device_id, org_id: req_org } => {
            let scoped_org = req_org.or(org_id);
            for event_type in event_types {
                bus.remove_subscription(id, &Subscription { event_type, device_id, org_id: scoped_org });
            }
        }
        InboundFrame::Ping => {
            bus.touch_client(id);
            bus.send_pong(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_parses_multiple_event_types_from_one_message() {
        let text = r#"{"type":"subscribe","event_types":["device_status","alert_created"],"device_id":null,"org_id":null}"#;
        let frame: InboundFrame = serde_json::from_str(text).expect("wire frame should parse");
        match frame {
            InboundFrame::Subscribe { event_types, device_id, org_id } => {
                assert_eq!(event_types, vec![EventType::DeviceStatus, EventType::AlertCreated]);
                assert_eq!(device_id, None);
                assert_eq!(org_id, None);
            }
            other => panic!("expected Subscribe, got {other:?}"),
        }
    }

    #[test]
    fn unsubscribe_frame_parses_multiple_event_types_and_a_scoped_device() {
        let device_id = Uuid::new_v4();
        let text = format!(
            r#"{{"type":"unsubscribe","event_types":["metrics_update"],"device_id":"{device_id}"}}"#
        );
        let frame: InboundFrame = serde_json::from_str(&text).expect("wire frame should parse");
        match frame {
            InboundFrame::Unsubscribe { event_types, device_id: parsed_device, org_id } => {
                assert_eq!(event_types, vec![EventType::MetricsUpdate]);
                assert_eq!(parsed_device, Some(device_id));
                assert_eq!(org_id, None);
            }
            other => panic!("expected Unsubscribe, got {other:?}"),
        }
    }

    #[test]
    fn ping_frame_parses_with_no_body() {
        let frame: InboundFrame = serde_json::from_str(r#"{"type":"ping"}"#).expect("ping should parse");
        assert!(matches!(frame, InboundFrame::Ping));
    }
}
