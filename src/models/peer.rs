use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A remote node observed on the local network, keyed by `address`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    /// Display name announced by the peer; not unique
    pub display_name: String,
    /// `host:port` the peer answered on
    pub address: String,
    pub last_seen_at: DateTime<Utc>,
    pub online: bool,
}

/// What a node answers to a probe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct DeviceIdentity {
    pub name: String,
    pub address: String,
}

/// On-demand probe of a single host
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProbeRequest {
    /// `host:port`, or a bare host using this node's port
    pub address: String,
}
