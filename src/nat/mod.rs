//! NAT coordination.

pub mod matrix;
pub mod turn;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cache::Cache;
use crate::store::models::NatType;
use crate::store::Store;
use crate::topology::TopologyResolver;
use turn::{RelayPool, TurnAllocation};

const NAT_PROBE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StunProbeReport {
    pub nat_type: NatType,
    pub public_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatProbeResult {
    pub device_id: Uuid,
    pub nat_type: NatType,
    pub public_endpoint: String,
    pub probe_time: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinateResult {
    pub method: matrix::TraversalMethod,
    pub endpoint_a: Option<String>,
    pub endpoint_b: Option<String>,
    pub turn_allocation: Option<TurnAllocation>,
}

#[derive(Debug, thiserror::Error)]
pub enum NatError {
    #[error("device not found")]
    DeviceNotFound,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

fn probe_cache_key(device_id: Uuid) -> String {
    format!("nat:probe:{device_id}")
}

#[derive(Clone)]
pub struct NatCoordinator {
    store: Store,
    cache: Cache,
    topology: TopologyResolver,
    relay_pool: Arc<dyn RelayPool>,
}

impl NatCoordinator {
    pub fn new(store: Store, cache: Cache, topology: TopologyResolver, relay_pool: Arc<dyn RelayPool>) -> Self {
        Self { store, cache, topology, relay_pool }
    }

    /// `probe(device_id, local_endpoint) → NATProbeResult`. The control
    /// plane doesn't speak STUN itself — the device agent reports what it
    /// observed and this classifies/caches it. A change persists back to
    /// the device row and invalidates topology.
    pub async fn probe(&self, device_id: Uuid, report: StunProbeReport) -> Result<NatProbeResult, NatError> {
        let device = self.store.get_device(device_id).await?.ok_or(NatError::DeviceNotFound)?;

        let changed = device.nat_type != report.nat_type
            || device.public_endpoint.as_deref() != Some(report.public_endpoint.as_str());

        if changed {
            self.store
                .set_device_nat(device_id, report.nat_type, Some(&report.public_endpoint))
                .await?;
            self.topology
                .invalidate_for_device_change(device.virtual_network_id, &device)
                .await;
        }

        let result = NatProbeResult {
            device_id,
            nat_type: report.nat_type,
            public_endpoint: report.public_endpoint,
            probe_time: chrono::Utc::now(),
        };

        if let Err(e) = self.cache.set_json(&probe_cache_key(device_id), &result, NAT_PROBE_TTL).await {
            tracing::warn!(error = %e, %device_id, "failed to cache nat probe result");
        }

        Ok(result)
    }

    /// `update_public_endpoint(device_id, endpoint)` — a lighter path
    /// than a full probe, used when a device's endpoint changes without
    /// its NAT classification changing (e.g. address rebinding).
    pub async fn update_public_endpoint(&self, device_id: Uuid, endpoint: &str) -> Result<(), NatError> {
        let device = self.store.get_device(device_id).await?.ok_or(NatError::DeviceNotFound)?;
        if device.public_endpoint.as_deref() != Some(endpoint) {
            self.store.set_device_endpoint(device_id, endpoint).await?;
            self.topology
                .invalidate_for_device_change(device.virtual_network_id, &device)
                .await;
        }
        Ok(())
    }

    /// `coordinate(device_a, device_b) → {method, endpoints, turn_allocation?}`
    pub async fn coordinate(&self, device_a: Uuid, device_b: Uuid) -> Result<CoordinateResult, NatError> {
        let a = self.store.get_device(device_a).await?.ok_or(NatError::DeviceNotFound)?;
        let b = self.store.get_device(device_b).await?.ok_or(NatError::DeviceNotFound)?;

        let method = matrix::decide(a.nat_type, b.nat_type);
        let turn_allocation = if method == matrix::TraversalMethod::Turn {
            turn::allocate(self.relay_pool.as_ref(), device_a, device_b)
        } else {
            None
        };

        Ok(CoordinateResult {
            method,
            endpoint_a: a.public_endpoint,
            endpoint_b: b.public_endpoint,
            turn_allocation,
        })
    }
}
