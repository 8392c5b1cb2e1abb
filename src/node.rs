//! Node service object
//!
//! Wires the registry, hub, discovery engine and transfer orchestrator
//! together. Nothing here is global: tests build as many nodes as they need.

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::discovery::{Discovery, PeerClient};
use crate::error::AppResult;
use crate::hub::EventHub;
use crate::models::DeviceIdentity;
use crate::peers::{run_reaper, PeerRegistry};
use crate::staging::StagingStore;
use crate::transfer::TransferOrchestrator;

#[derive(Clone)]
pub struct Node {
    pub config: Config,
    pub identity: DeviceIdentity,
    pub hub: EventHub,
    pub registry: PeerRegistry,
    pub discovery: Discovery,
    pub transfers: TransferOrchestrator,
}

/// Background loops of a started node
pub struct NodeHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Build a node announcing the identity derived from `config`
    pub async fn new(config: Config) -> AppResult<Self> {
        let identity = DeviceIdentity {
            name: config.resolved_device_name(),
            address: config.resolved_advertise_address(),
        };
        Self::with_identity(config, identity).await
    }

    pub async fn with_identity(config: Config, identity: DeviceIdentity) -> AppResult<Self> {
        let hub = EventHub::new(config.subscriber_queue_capacity);
        let registry = PeerRegistry::new(
            hub.clone(),
            config.liveness_timeout(),
            config.retention_timeout(),
        );
        let client = PeerClient::new(
            config.probe_timeout(),
            config.control_timeout(),
            config.data_timeout(),
        )?;
        let staging = StagingStore::open(&config.staging_dir).await?;
        let inbox = StagingStore::open(&config.inbox_dir).await?;

        let discovery = Discovery::new(
            client.clone(),
            registry.clone(),
            identity.clone(),
            config.port,
        );
        let transfers = TransferOrchestrator::new(
            registry.clone(),
            hub.clone(),
            staging,
            inbox,
            client,
            identity.clone(),
        );

        Ok(Self {
            config,
            identity,
            hub,
            registry,
            discovery,
            transfers,
        })
    }

    /// Spawn the reaper and, when enabled, the subnet sweep
    pub fn start(&self) -> NodeHandle {
        info!(name = %self.identity.name, address = %self.identity.address, "Starting node");

        let mut tasks = vec![tokio::spawn(run_reaper(
            self.registry.clone(),
            self.config.reaper_interval(),
        ))];

        if self.config.discovery_enabled {
            tasks.push(tokio::spawn(
                self.discovery.clone().run(self.config.sweep_interval()),
            ));
        } else {
            info!("Subnet sweep disabled; peers come from probes and offers only");
        }

        NodeHandle { tasks }
    }
}

impl NodeHandle {
    pub fn stop(self) {
        for task in self.tasks {
            task.abort();
        }
        info!("Node stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_stop() {
        let root = std::env::temp_dir().join(format!("lanshare-node-{}", uuid::Uuid::new_v4()));
        let config = Config {
            staging_dir: root.join("staging"),
            inbox_dir: root.join("inbox"),
            discovery_enabled: false,
            ..Config::default()
        };
        let node = Node::with_identity(
            config,
            DeviceIdentity {
                name: "test".to_string(),
                address: "127.0.0.1:18080".to_string(),
            },
        )
        .await
        .unwrap();

        let handle = node.start();
        assert_eq!(handle.tasks.len(), 1);
        handle.stop();
    }
}
