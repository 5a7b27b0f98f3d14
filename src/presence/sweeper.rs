//! Background offline sweeper.

use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::eventbus::{Event, EventBus};
use crate::store::Store;
use crate::topology::TopologyResolver;

pub struct SweeperConfig {
    pub offline_threshold: Duration,
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            offline_threshold: Duration::from_secs(5 * 60),
            interval: Duration::from_secs(30),
        }
    }
}

/// Runs until `token` is cancelled. Every tick, any device whose
/// `last_seen_at` is older than `offline_threshold` is flipped offline in
/// one statement and a `device_status` event is emitted per device.
pub async fn run(
    store: Store,
    topology: TopologyResolver,
    bus: EventBus,
    config: SweeperConfig,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("presence sweeper shutting down");
                return;
            }
            _ = ticker.tick() => {
                let threshold = Utc::now() - chrono::Duration::from_std(config.offline_threshold).unwrap_or_default();
                match store.sweep_offline_devices(threshold).await {
                    Ok(ids) => {
                        for device_id in ids {
                            if let Ok(Some(device)) = store.get_device(device_id).await {
                                topology.invalidate_for_device_change(device.virtual_network_id, &device).await;
                                bus.publish(Event::device_status(device_id, false)).await;
                                tracing::info!(%device_id, "device marked offline by sweeper");
                            }
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "presence sweep failed"),
                }
            }
        }
    }
}
