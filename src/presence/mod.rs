//! Presence & session tracking.

pub mod sweeper;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::eventbus::{Event, EventBus};
use crate::store::models::ConnectionType;
use crate::store::Store;
use crate::topology::TopologyResolver;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeartbeatMetrics {
    pub bytes_sent: Option<i64>,
    pub bytes_received: Option<i64>,
    pub latency_ms: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("device not found")]
    DeviceNotFound,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct PresenceTracker {
    store: Store,
    topology: TopologyResolver,
    bus: EventBus,
}

impl PresenceTracker {
    pub fn new(store: Store, topology: TopologyResolver, bus: EventBus) -> Self {
        Self { store, topology, bus }
    }

    /// `heartbeat(device_id, metrics)` flips the device online, refreshes
    /// `last_seen_at`, and invalidates topology if the device
    /// was previously offline (its own peer set is unaffected, but it now
    /// appears in every other online device's peer set).
    pub async fn heartbeat(&self, device_id: Uuid, metrics: HeartbeatMetrics) -> Result<(), PresenceError> {
        let device = self.store.get_device(device_id).await?.ok_or(PresenceError::DeviceNotFound)?;
        let was_online = device.online;
        let now = Utc::now();
        self.store.set_device_presence(device_id, true, now).await?;
        tracing::trace!(%device_id, ?metrics, "heartbeat received");

        if !was_online {
            self.topology.invalidate_for_device_change(device.virtual_network_id, &device).await;
            self.bus
                .publish(Event::device_status(device_id, true))
                .await;
        }
        Ok(())
    }

    /// Sessions are keyed by the unordered pair among currently active
    /// sessions; reopening while one is active is a no-op.
    pub async fn session_start(
        &self,
        a: Uuid,
        b: Uuid,
        connection_type: ConnectionType,
    ) -> Result<Uuid, PresenceError> {
        if let Some(existing) = self.store.find_active_session(a, b).await? {
            return Ok(existing.id);
        }
        let session = self.store.start_session(a, b, connection_type).await?;
        Ok(session.id)
    }

    pub async fn session_update(
        &self,
        session_id: Uuid,
        bytes_tx: i64,
        bytes_rx: i64,
        latency_ms: Option<f64>,
    ) -> Result<(), PresenceError> {
        self.store.add_session_counters(session_id, bytes_tx, bytes_rx, latency_ms).await?;
        Ok(())
    }

    pub async fn session_end(&self, session_id: Uuid) -> Result<(), PresenceError> {
        self.store.end_session(session_id).await?;
        Ok(())
    }
}
