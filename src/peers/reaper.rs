//! Periodic liveness pass over the registry

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::PeerRegistry;

/// Run the liveness pass every `interval`, forever
pub async fn run_reaper(registry: PeerRegistry, interval: Duration) {
    info!("Starting peer reaper (every {:?})", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let report = registry.reap().await;
        if !report.went_offline.is_empty() || !report.evicted.is_empty() {
            debug!(
                offline = report.went_offline.len(),
                evicted = report.evicted.len(),
                "Reaper pass"
            );
        }
    }
}
