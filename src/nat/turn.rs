//! TURN credential allocation.
//!
//! Relay selection is pluggable: `RelayPool` is a trait so the
//! lowest-load policy can be swapped for something smarter without
//! touching the coordinator.

use rand::Rng;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_TURN_LIFETIME: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TurnAllocation {
    pub relay_address: String,
    pub username: String,
    pub password: String,
    pub lifetime_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RelayServer {
    pub address: String,
    pub load: u32,
}

/// Picks a relay server for a TURN allocation. The default implementation
/// is lowest-load; a static single-relay pool is provided for
/// deployments without a dynamic relay fleet.
pub trait RelayPool: Send + Sync {
    fn pick(&self) -> Option<RelayServer>;
}

pub struct StaticRelayPool {
    servers: Vec<RelayServer>,
}

impl StaticRelayPool {
    pub fn new(addresses: Vec<String>) -> Self {
        Self {
            servers: addresses
                .into_iter()
                .map(|address| RelayServer { address, load: 0 })
                .collect(),
        }
    }
}

impl RelayPool for StaticRelayPool {
    fn pick(&self) -> Option<RelayServer> {
        self.servers.iter().min_by_key(|s| s.load).cloned()
    }
}

fn random_password() -> String {
    let bytes: [u8; 24] = rand::thread_rng().gen();
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

/// `username = turn-<a8>-<b8>`, a short-lived cryptographically random
/// password, default lifetime 10 min — client refreshes before expiry.
pub fn allocate(pool: &dyn RelayPool, device_a: Uuid, device_b: Uuid) -> Option<TurnAllocation> {
    let relay = pool.pick()?;
    let a8 = &device_a.simple().to_string()[..8.min(device_a.simple().to_string().len())];
    let b8 = &device_b.simple().to_string()[..8.min(device_b.simple().to_string().len())];
    let username = format!("turn-{a8}-{b8}");
    Some(TurnAllocation {
        relay_address: relay.address,
        username,
        password: random_password(),
        lifetime_secs: DEFAULT_TURN_LIFETIME.as_secs(),
    })
}
