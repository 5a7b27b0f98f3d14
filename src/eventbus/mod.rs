//! Real-time event bus & subscription fan-out.
//!
//! This is the most intricate concurrent component: any instance can
//! publish, every connected client whose subscription matches receives
//! exactly one copy, slow clients never block fast ones, dead clients are
//! reaped promptly. The client map is a `parking_lot::RwLock` (no `.await`
//! point is ever reached while it's held) rather than an actor —
//! register/unregister/dispatch are the three logical "mailbox"
//! operations against it; here they're plain synchronized methods since
//! none of them need to suspend.

pub mod client;
pub mod heartbeat;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{Cache, EVENT_CHANNEL};
use client::{ClientHandle, ClientId, OutboundFrame, Subscription};
use crate::telemetry::EVENTBUS_DROPPED_TOTAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DeviceStatus,
    AlertCreated,
    AlertUpdated,
    MetricsUpdate,
    SessionUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub device_id: Option<Uuid>,
    pub org_id: Option<Uuid>,
    pub data: serde_json::Value,
}

impl Event {
    pub fn device_status(device_id: Uuid, online: bool) -> Self {
        Self {
            event_type: EventType::DeviceStatus,
            device_id: Some(device_id),
            org_id: None,
            data: serde_json::json!({ "online": online }),
        }
    }

    pub fn alert_created(org_id: Uuid, device_id: Option<Uuid>, data: serde_json::Value) -> Self {
        Self { event_type: EventType::AlertCreated, device_id, org_id: Some(org_id), data }
    }

    pub fn alert_updated(org_id: Uuid, device_id: Option<Uuid>, data: serde_json::Value) -> Self {
        Self { event_type: EventType::AlertUpdated, device_id, org_id: Some(org_id), data }
    }

    pub fn metrics_update(device_id: Uuid, data: serde_json::Value) -> Self {
        Self { event_type: EventType::MetricsUpdate, device_id: Some(device_id), org_id: None, data }
    }

    pub fn session_update(device_id: Uuid, data: serde_json::Value) -> Self {
        Self { event_type: EventType::SessionUpdate, device_id: Some(device_id), org_id: None, data }
    }
}

#[derive(Clone)]
pub struct EventBus {
    cache: Cache,
    clients: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
}

impl EventBus {
    pub fn new(cache: Cache) -> Self {
        Self { cache, clients: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Encode and publish to the single well-known channel. Non-blocking:
    /// if the substrate is unreachable the publisher logs and proceeds,
    /// accepting at-most-once delivery.
    pub async fn publish(&self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(payload) => self.cache.publish(EVENT_CHANNEL, &payload).await,
            Err(e) => tracing::error!(error = %e, "failed to encode event for publish"),
        }
    }

    pub fn register_client(&self, handle: ClientHandle) {
        self.clients.write().insert(handle.id, handle);
    }

    pub fn unregister_client(&self, id: ClientId) {
        self.clients.write().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn add_subscription(&self, id: ClientId, sub: Subscription) {
        if let Some(client) = self.clients.read().get(&id) {
            let mut subs = client.subscriptions.write();
            if !subs.contains(&sub) {
                subs.push(sub);
            }
        }
    }

    pub fn remove_subscription(&self, id: ClientId, sub: &Subscription) {
        if let Some(client) = self.clients.read().get(&id) {
            client.subscriptions.write().retain(|s| s != sub);
        }
    }

    pub fn touch_client(&self, id: ClientId) {
        if let Some(client) = self.clients.read().get(&id) {
            client.touch();
        }
    }

    pub fn send_pong(&self, id: ClientId) {
        if let Some(client) = self.clients.read().get(&id) {
            let _ = client.sender.try_send(OutboundFrame::pong());
        }
    }

    pub fn send_error(&self, id: ClientId, message: &str) {
        if let Some(client) = self.clients.read().get(&id) {
            let _ = client.sender.try_send(OutboundFrame::error(message));
        }
    }

    /// Cancels and unregisters every client whose last observed pong
    /// exceeds the staleness window.
    pub fn reap_stale_clients(&self) {
        let stale: Vec<ClientId> = self
            .clients
            .read()
            .values()
            .filter(|c| c.is_stale())
            .map(|c| c.id)
            .collect();
        for id in stale {
            tracing::info!(client_id = %id, "reaping stale event bus client");
            if let Some(client) = self.clients.read().get(&id) {
                client.cancel();
            }
            self.unregister_client(id);
        }
    }

    /// Mailbox 3: dispatch. Iterates the client map under a read lock and
    /// performs a non-blocking enqueue per matching subscription;
    /// backpressure is per-client, not global.
    pub fn dispatch(&self, event: &Event) {
        let frame = OutboundFrame::from_event(event);
        let clients = self.clients.read();
        for client in clients.values() {
            if client.subscriptions.read().iter().any(|s| s.matches(event)) {
                if client.sender.try_send(frame.clone()).is_err() {
                    tracing::warn!(client_id = %client.id, "client send buffer full, dropping event");
                    EVENTBUS_DROPPED_TOTAL.inc();
                }
            }
        }
    }

    /// Instance-local fan-out loop: subscribes once to the shared
    /// pub/sub channel and dispatches every decoded event. Runs until
    /// `token` is cancelled, resubscribing with backoff if the
    /// connection drops.
    pub async fn run_fanout_loop(self, token: tokio_util::sync::CancellationToken) {
        loop {
            if token.is_cancelled() {
                return;
            }
            let mut pubsub = match self.cache.subscribe(EVENT_CHANNEL).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(error = %e, "event bus pub/sub subscribe failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                    continue;
                }
            };
            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    msg = futures_util::StreamExt::next(&mut stream) => {
                        match msg {
                            Some(msg) => {
                                let payload: String = match msg.get_payload() {
                                    Ok(p) => p,
                                    Err(e) => { tracing::warn!(error = %e, "bad event payload"); continue; }
                                };
                                match serde_json::from_str::<Event>(&payload) {
                                    Ok(event) => self.dispatch(&event),
                                    Err(e) => tracing::warn!(error = %e, "failed to decode event"),
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            tracing::warn!("event bus pub/sub stream ended, resubscribing");
        }
    }
}
