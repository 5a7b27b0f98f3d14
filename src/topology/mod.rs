//! Topology resolver: per-device peer view.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::cache::Cache;
use crate::store::models::{Device, NatType};
use crate::store::Store;
use crate::telemetry::TOPOLOGY_RESOLVE_DURATION;

const PEER_CONFIG_TTL: Duration = Duration::from_secs(10 * 60);
const PERSISTENT_KEEPALIVE_SECS: u16 = 25;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerView {
    pub public_key: String,
    pub allowed_ips: Vec<String>,
    pub endpoint: Option<String>,
    pub persistent_keepalive: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceView {
    pub address: String,
    pub listen_port: u16,
    pub dns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub interface: InterfaceView,
    pub peers: Vec<PeerView>,
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("device not found")]
    DeviceNotFound,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct TopologyResolver {
    store: Store,
    cache: Cache,
}

fn cache_key(device_id: Uuid) -> String {
    format!("peer:config:{device_id}")
}

/// Keepalive is needed for a pair whenever either side's NAT type isn't
/// `none` or `full_cone` — those two can receive unsolicited inbound
/// traffic without a mapping-refreshing heartbeat, but if either end of
/// the pair is more restrictive than that, the mapping on that end needs
/// refreshing regardless of how permissive the other end is.
fn needs_keepalive(local: NatType, peer: NatType) -> bool {
    fn requires_refresh(nat_type: NatType) -> bool {
        !matches!(nat_type, NatType::None | NatType::FullCone)
    }
    requires_refresh(local) || requires_refresh(peer)
}

impl TopologyResolver {
    pub fn new(store: Store, cache: Cache) -> Self {
        Self { store, cache }
    }

    /// Resolves the peer set a device should configure its tunnel with.
    pub async fn peers(&self, device_id: Uuid) -> Result<Vec<PeerView>, TopologyError> {
        let device = self
            .store
            .get_device(device_id)
            .await?
            .ok_or(TopologyError::DeviceNotFound)?;

        if let Some(cached) = self.cache.get_json::<Vec<PeerView>>(&cache_key(device_id)).await.ok().flatten() {
            return Ok(cached);
        }

        let _timer = TOPOLOGY_RESOLVE_DURATION.start_timer();
        let online = self.store.list_online_devices(device.virtual_network_id).await?;
        let peers: Vec<PeerView> = online
            .into_iter()
            .filter(|d| d.id != device_id)
            .map(|d| PeerView {
                public_key: d.public_key,
                allowed_ips: vec![format!("{}/32", d.virtual_ip.ip())],
                endpoint: d.public_endpoint,
                persistent_keepalive: needs_keepalive(device.nat_type, d.nat_type).then_some(PERSISTENT_KEEPALIVE_SECS),
            })
            .collect();

        if let Err(e) = self.cache.set_json(&cache_key(device_id), &peers, PEER_CONFIG_TTL).await {
            tracing::warn!(error = %e, %device_id, "failed to cache peer config");
        }

        Ok(peers)
    }

    /// Assembles the full tunnel config for a device. The private key
    /// never leaves the device; the control plane only fills
    /// in the interface address/mask (taken from the network CIDR, not
    /// `/32`) and listen port alongside the resolved peer set.
    pub async fn full_config(
        &self,
        device_id: Uuid,
        listen_port: u16,
    ) -> Result<TunnelConfig, TopologyError> {
        let device = self
            .store
            .get_device(device_id)
            .await?
            .ok_or(TopologyError::DeviceNotFound)?;
        let network = self
            .store
            .get_virtual_network(device.virtual_network_id)
            .await?
            .ok_or(TopologyError::DeviceNotFound)?;

        let prefix = network.cidr.prefix();
        let peers = self.peers(device_id).await?;

        Ok(TunnelConfig {
            interface: InterfaceView {
                address: format!("{}/{}", device.virtual_ip.ip(), prefix),
                listen_port,
                dns: network.dns_servers,
            },
            peers,
        })
    }

    /// Drops the cached peer set for the affected device; callers invoke
    /// this on any event that can change the device's peer view.
    pub async fn invalidate(&self, device_id: Uuid) {
        if let Err(e) = self.cache.invalidate(&cache_key(device_id)).await {
            tracing::warn!(error = %e, %device_id, "failed to invalidate peer config cache");
        }
    }

    /// Membership changes affect every device in the network, so every
    /// cached peer set in the network is dropped.
    pub async fn refresh(&self, virtual_network_id: Uuid) -> Result<(), TopologyError> {
        let devices = self.store.list_devices(virtual_network_id).await?;
        for device in devices {
            self.invalidate(device.id).await;
        }
        Ok(())
    }

    pub async fn invalidate_for_device_change(&self, virtual_network_id: Uuid, changed: &Device) {
        self.invalidate(changed.id).await;
        // other online peers have this device in their own peer set too.
        if let Ok(peers) = self.store.list_online_devices(virtual_network_id).await {
            for peer in peers {
                if peer.id != changed.id {
                    self.invalidate(peer.id).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_not_needed_when_both_sides_are_unrestricted() {
        assert!(!needs_keepalive(NatType::None, NatType::FullCone));
        assert!(!needs_keepalive(NatType::FullCone, NatType::None));
        assert!(!needs_keepalive(NatType::FullCone, NatType::FullCone));
    }

    #[test]
    fn keepalive_needed_when_the_peer_is_restrictive() {
        assert!(needs_keepalive(NatType::None, NatType::RestrictedCone));
        assert!(needs_keepalive(NatType::FullCone, NatType::PortRestrictedCone));
        assert!(needs_keepalive(NatType::None, NatType::Symmetric));
    }

    #[test]
    fn keepalive_needed_when_the_local_device_is_restrictive_even_if_the_peer_is_not() {
        // A is full_cone, B is symmetric: B's own view of A still needs a
        // keepalive, since B's mapping is the one that needs refreshing.
        assert!(needs_keepalive(NatType::Symmetric, NatType::FullCone));
    }

    #[test]
    fn keepalive_needed_when_nat_type_is_unknown() {
        // unknown is treated conservatively: assume the worse case.
        assert!(needs_keepalive(NatType::Unknown, NatType::FullCone));
        assert!(needs_keepalive(NatType::FullCone, NatType::Unknown));
    }
}
