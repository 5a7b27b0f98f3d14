//! Per-virtual-network IP address allocator.
//!
//! A pool is lazily seeded the first time its network is touched: parse
//! the CIDR, load the already-allocated addresses from the store. Seeding
//! is async (it hits the database) and is double-checked via a
//! `tokio::sync::OnceCell` per network so concurrent first-callers don't
//! race to seed twice; steady-state allocation is a synchronous
//! `parking_lot::Mutex` over an in-memory set, so no I/O happens while
//! the lock is held.
//!
//! Two control-plane instances can still race on the same address: the
//! database UNIQUE constraint on `(virtual_network_id, virtual_ip)` is the
//! correctness backstop, and the caller (`identity::register`) retries
//! allocation on a conflict rather than this module doing any
//! cross-instance coordination.

use dashmap::DashMap;
use ipnetwork::IpNetwork;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::store::Store;

#[derive(Debug, thiserror::Error)]
pub enum IpPoolError {
    #[error("ip pool exhausted for network")]
    PoolExhausted,
    #[error("invalid cidr: {0}")]
    InvalidCidr(String),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

struct NetworkPool {
    cidr: IpNetwork,
    allocated: BTreeSet<IpAddr>,
}

impl NetworkPool {
    /// First free host address, skipping the network and broadcast
    /// addresses, scanned in CIDR order.
    fn next_free(&self) -> Option<IpAddr> {
        match self.cidr {
            IpNetwork::V4(net) => {
                let network = net.network();
                let broadcast = net.broadcast();
                net.iter().find(|ip| {
                    *ip != network && *ip != broadcast && !self.allocated.contains(&IpAddr::V4(*ip))
                })
                .map(IpAddr::V4)
            }
            IpNetwork::V6(net) => net
                .iter()
                .find(|ip| !self.allocated.contains(&IpAddr::V6(*ip)))
                .map(IpAddr::V6),
        }
    }
}

type PoolCell = Arc<OnceCell<Mutex<NetworkPool>>>;

#[derive(Clone, Default)]
pub struct IpPoolManager {
    pools: Arc<DashMap<Uuid, PoolCell>>,
}

impl IpPoolManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell_for(&self, virtual_network_id: Uuid) -> PoolCell {
        self.pools
            .entry(virtual_network_id)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    async fn seed(store: &Store, virtual_network_id: Uuid, cidr: IpNetwork) -> Result<Mutex<NetworkPool>, IpPoolError> {
        let existing = store.allocated_ips(virtual_network_id).await?;
        let allocated = existing.into_iter().map(|n| n.ip()).collect();
        Ok(Mutex::new(NetworkPool { cidr, allocated }))
    }

    pub async fn allocate(
        &self,
        store: &Store,
        virtual_network_id: Uuid,
        cidr: IpNetwork,
    ) -> Result<IpAddr, IpPoolError> {
        let cell = self.cell_for(virtual_network_id);
        let pool = cell
            .get_or_try_init(|| Self::seed(store, virtual_network_id, cidr))
            .await?;
        let mut guard = pool.lock();
        let ip = guard.next_free().ok_or(IpPoolError::PoolExhausted)?;
        guard.allocated.insert(ip);
        Ok(ip)
    }

    pub async fn release(&self, virtual_network_id: Uuid, ip: IpAddr) {
        if let Some(cell) = self.pools.get(&virtual_network_id) {
            if let Some(pool) = cell.get() {
                pool.lock().allocated.remove(&ip);
            }
        }
    }

    /// Drops the cached pool so the next `allocate` reseeds from the
    /// store (used after bulk device changes or by admin tooling).
    pub fn refresh(&self, virtual_network_id: Uuid) {
        self.pools.remove(&virtual_network_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_network_and_broadcast_addresses() {
        let cidr: IpNetwork = "10.100.1.0/24".parse().unwrap();
        let pool = NetworkPool {
            cidr,
            allocated: BTreeSet::new(),
        };
        let first = pool.next_free().unwrap();
        assert_eq!(first, "10.100.1.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn skips_already_allocated() {
        let cidr: IpNetwork = "10.100.1.0/30".parse().unwrap();
        let mut allocated = BTreeSet::new();
        allocated.insert("10.100.1.1".parse().unwrap());
        let pool = NetworkPool { cidr, allocated };
        // /30 has network .0, hosts .1/.2, broadcast .3 -- .1 is taken, so
        // .2 is the only usable address left.
        assert_eq!(pool.next_free(), Some("10.100.1.2".parse().unwrap()));
    }

    #[test]
    fn exhausted_when_all_hosts_taken() {
        let cidr: IpNetwork = "10.100.1.0/30".parse().unwrap();
        let mut allocated = BTreeSet::new();
        allocated.insert("10.100.1.1".parse().unwrap());
        allocated.insert("10.100.1.2".parse().unwrap());
        let pool = NetworkPool { cidr, allocated };
        assert_eq!(pool.next_free(), None);
    }
}
