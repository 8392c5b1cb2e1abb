//! Active subnet sweep and on-demand probing

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use futures::{stream, StreamExt};
use ipnetwork::Ipv4Network;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::PeerClient;
use crate::error::{AppError, AppResult};
use crate::models::{DeviceIdentity, Peer};
use crate::peers::PeerRegistry;

/// Upper bound on probes in flight during one sweep
const SWEEP_CONCURRENCY: usize = 512;

/// Outcome counts of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub responded: usize,
}

/// Active half of discovery: sweeps every local /24 for nodes answering on
/// the well-known port.
///
/// Discovery is one-directional. When this node reaches B, B learns nothing
/// about this node until B's own sweep reaches it or this node sends B an
/// offer. Segmented or asymmetric networks can leave peers undiscovered.
#[derive(Clone)]
pub struct Discovery {
    client: PeerClient,
    registry: PeerRegistry,
    identity: DeviceIdentity,
    port: u16,
}

impl Discovery {
    pub fn new(
        client: PeerClient,
        registry: PeerRegistry,
        identity: DeviceIdentity,
        port: u16,
    ) -> Self {
        Self {
            client,
            registry,
            identity,
            port,
        }
    }

    /// Sweep every `interval`, forever
    pub async fn run(self, interval: Duration) {
        info!("Starting subnet sweep on port {} (every {:?})", self.port, interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let locals = local_ipv4_addrs();
            if locals.is_empty() {
                debug!("No usable IPv4 interface, skipping sweep");
                continue;
            }

            let report = self.probe_all(sweep_candidates(&locals, self.port)).await;
            debug!(probed = report.probed, responded = report.responded, "Sweep finished");
        }
    }

    /// Probe every candidate concurrently; each probe times out on its own
    pub async fn probe_all(&self, candidates: Vec<String>) -> SweepReport {
        let probed = candidates.len();

        let responded = stream::iter(candidates)
            .map(|address| async move { self.probe(&address).await.is_ok() })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .filter(|ok| futures::future::ready(*ok))
            .count()
            .await;

        SweepReport { probed, responded }
    }

    /// Probe one address and register whoever answers there
    pub async fn probe(&self, address: &str) -> AppResult<Peer> {
        let identity = self.client.probe(address).await?;

        if identity.address == self.identity.address {
            return Err(AppError::bad_request(&format!("{} is this node", address)));
        }

        let (peer, _) = self.registry.upsert(&identity.name, address).await;
        Ok(peer)
    }

    /// On-demand probe; a bare host gets this node's port
    pub async fn probe_address(&self, address: &str) -> AppResult<Peer> {
        let address = normalize_address(address, self.port)?;
        self.probe(&address).await.map_err(|e| {
            warn!(%address, "On-demand probe failed: {}", e);
            e
        })
    }
}

/// Non-loopback IPv4 addresses of this machine
pub fn local_ipv4_addrs() -> Vec<Ipv4Addr> {
    match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter_map(|(_, ip)| match ip {
                IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_link_local() => Some(v4),
                _ => None,
            })
            .collect(),
        Err(e) => {
            warn!("Failed to list network interfaces: {}", e);
            Vec::new()
        }
    }
}

/// Every host address in the /24 of each local address, minus the locals
pub fn sweep_candidates(locals: &[Ipv4Addr], port: u16) -> Vec<String> {
    let mut hosts = BTreeSet::new();

    for local in locals {
        let Ok(subnet) = Ipv4Network::new(*local, 24) else {
            continue;
        };
        let network = subnet.network();
        let broadcast = subnet.broadcast();

        for ip in subnet.iter() {
            if ip != network && ip != broadcast && !locals.contains(&ip) {
                hosts.insert(ip);
            }
        }
    }

    hosts
        .into_iter()
        .map(|ip| format!("{}:{}", ip, port))
        .collect()
}

fn normalize_address(address: &str, default_port: u16) -> AppResult<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AppError::bad_request("Address is required"));
    }
    if address.contains(':') {
        return Ok(address.to_string());
    }
    Ok(format!("{}:{}", address, default_port))
}
