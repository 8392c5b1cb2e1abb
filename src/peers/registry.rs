use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::hub::{Event, EventHub};
use crate::models::Peer;

/// What an upsert did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First time this address answered
    Discovered,
    /// Known address that had been marked offline
    Revived,
    /// Known online address, `last_seen_at` bumped
    Refreshed,
}

/// Result of one liveness pass
#[derive(Debug, Default)]
pub struct ReapReport {
    pub went_offline: Vec<Peer>,
    pub evicted: Vec<String>,
}

/// Peers keyed by address, guarded by a single lock.
///
/// State changes and the matching hub events happen under the same write
/// lock, so observers see peer events in the order the state changed.
#[derive(Clone)]
pub struct PeerRegistry {
    peers: Arc<RwLock<HashMap<String, Peer>>>,
    hub: EventHub,
    liveness: chrono::Duration,
    retention: chrono::Duration,
}

impl PeerRegistry {
    pub fn new(hub: EventHub, liveness: Duration, retention: Duration) -> Self {
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
            hub,
            liveness: chrono::Duration::from_std(liveness).unwrap_or(chrono::Duration::seconds(60)),
            retention: chrono::Duration::from_std(retention)
                .unwrap_or(chrono::Duration::seconds(300)),
        }
    }

    /// Insert or refresh a peer, marking it online as of now
    pub async fn upsert(&self, display_name: &str, address: &str) -> (Peer, UpsertOutcome) {
        self.upsert_at(display_name, address, Utc::now()).await
    }

    pub async fn upsert_at(
        &self,
        display_name: &str,
        address: &str,
        now: DateTime<Utc>,
    ) -> (Peer, UpsertOutcome) {
        let mut peers = self.peers.write().await;

        let outcome = match peers.get_mut(address) {
            Some(peer) => {
                let outcome = if peer.online {
                    UpsertOutcome::Refreshed
                } else {
                    UpsertOutcome::Revived
                };
                peer.display_name = display_name.to_string();
                peer.last_seen_at = now;
                peer.online = true;
                outcome
            }
            None => {
                peers.insert(
                    address.to_string(),
                    Peer {
                        display_name: display_name.to_string(),
                        address: address.to_string(),
                        last_seen_at: now,
                        online: true,
                    },
                );
                UpsertOutcome::Discovered
            }
        };

        let peer = peers[address].clone();

        if outcome != UpsertOutcome::Refreshed {
            info!(name = %peer.display_name, address = %peer.address, ?outcome, "Peer online");
            metrics::counter!("lanshare_peers_discovered_total", 1);
            metrics::gauge!("lanshare_peers_online", online_count(&peers) as f64);
            self.hub.publish(Event::PeerDiscovered(peer.clone())).await;
        }

        (peer, outcome)
    }

    /// Snapshot of online peers, in no particular order
    pub async fn list_online(&self) -> Vec<Peer> {
        self.peers
            .read()
            .await
            .values()
            .filter(|p| p.online)
            .cloned()
            .collect()
    }

    pub async fn get(&self, address: &str) -> Option<Peer> {
        self.peers.read().await.get(address).cloned()
    }

    /// Address of a peer announcing `display_name`.
    ///
    /// Names are not unique. Online peers win over offline ones, then the most
    /// recently seen; the result is a best guess, not an identity.
    pub async fn resolve(&self, display_name: &str) -> Option<String> {
        self.peers
            .read()
            .await
            .values()
            .filter(|p| p.display_name == display_name)
            .max_by_key(|p| (p.online, p.last_seen_at))
            .map(|p| p.address.clone())
    }

    /// Liveness pass as of now
    pub async fn reap(&self) -> ReapReport {
        self.reap_at(Utc::now()).await
    }

    /// Flip stale peers offline (once each) and evict expired ones
    pub async fn reap_at(&self, now: DateTime<Utc>) -> ReapReport {
        let mut peers = self.peers.write().await;
        let mut report = ReapReport::default();

        peers.retain(|address, peer| {
            let age = now - peer.last_seen_at;
            if age > self.retention {
                report.evicted.push(address.clone());
                return false;
            }
            if age > self.liveness && peer.online {
                peer.online = false;
                report.went_offline.push(peer.clone());
            }
            true
        });

        if !report.went_offline.is_empty() || !report.evicted.is_empty() {
            metrics::gauge!("lanshare_peers_online", online_count(&peers) as f64);
        }

        for peer in &report.went_offline {
            info!(name = %peer.display_name, address = %peer.address, "Peer offline");
            self.hub.publish(Event::PeerOffline(peer.clone())).await;
        }
        for address in &report.evicted {
            debug!(%address, "Evicted expired peer");
        }

        report
    }
}

fn online_count(peers: &HashMap<String, Peer>) -> usize {
    peers.values().filter(|p| p.online).count()
}
