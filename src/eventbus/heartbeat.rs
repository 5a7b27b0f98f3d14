//! Heartbeat monitor: reaps event bus clients that stopped answering
//! pings. Runs alongside, not inside, each connection's own
//! reader/writer loop so a single slow client can't starve the sweep.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::EventBus;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run(bus: EventBus, token: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("event bus heartbeat monitor shutting down");
                return;
            }
            _ = ticker.tick() => {
                bus.reap_stale_clients();
            }
        }
    }
}
