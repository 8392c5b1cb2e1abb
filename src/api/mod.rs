pub mod discover;
pub mod health;
pub mod metrics;
pub mod openapi;
pub mod peers;
pub mod rpc;
pub mod transfers;
pub mod ws;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;
use crate::discovery::Discovery;
use crate::hub::EventHub;
use crate::models::DeviceIdentity;
use crate::node::Node;
use crate::peers::PeerRegistry;
use crate::transfer::TransferOrchestrator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub identity: DeviceIdentity,
    pub hub: EventHub,
    pub registry: PeerRegistry,
    pub discovery: Discovery,
    pub transfers: TransferOrchestrator,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(node: &Node) -> Self {
        Self {
            config: node.config.clone(),
            identity: node.identity.clone(),
            hub: node.hub.clone(),
            registry: node.registry.clone(),
            discovery: node.discovery.clone(),
            transfers: node.transfers.clone(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
