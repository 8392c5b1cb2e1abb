//! OpenAPI documentation for the lanshare node API

use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

/// API Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "lanshare API",
        version = "0.1.0",
        description = "Serverless LAN file sharing node.\n\n## Features\n- Discover peers on the local /24 subnets\n- Offer files to peers and accept or reject incoming offers\n- Follow peer and transfer changes over a WebSocket",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local node")
    ),
    tags(
        (name = "discovery", description = "Identity announced to other nodes"),
        (name = "peers", description = "Known peers and on-demand probing"),
        (name = "transfers", description = "Send, accept, reject and download files"),
        (name = "rpc", description = "Node-to-node calls, not meant for observers"),
        (name = "events", description = "Live event stream"),
        (name = "ops", description = "Health and metrics")
    ),
    paths(
        // Discovery
        crate::api::discover::discover,
        crate::api::discover::device_name,
        // Peers
        crate::api::peers::list,
        crate::api::peers::probe,
        // Transfers
        crate::api::transfers::list,
        crate::api::transfers::get,
        crate::api::transfers::send,
        crate::api::transfers::accept,
        crate::api::transfers::reject,
        crate::api::transfers::download,
        // Peer RPC
        crate::api::rpc::notify_transfer,
        crate::api::rpc::accept_remote,
        crate::api::rpc::reject_remote,
        crate::api::rpc::transfer_failed,
        crate::api::rpc::upload,
        // WebSocket (may not render in Swagger UI)
        crate::api::ws::ws_handler,
        // Ops
        crate::api::health::health_check,
        crate::api::metrics::metrics_handler,
    ),
    components(
        schemas(
            crate::models::Peer,
            crate::models::DeviceIdentity,
            crate::models::ProbeRequest,
            crate::models::Transfer,
            crate::models::TransferOffer,
            crate::models::TransferFailure,
            crate::models::TransferStatus,
            crate::models::TransferDirection,
            crate::api::health::HealthResponse,
            ErrorResponseSchema,
            ErrorDetailSchema,
        )
    )
)]
pub struct ApiDoc;

// --- Error Schemas ---

/// Body of every non-2xx response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponseSchema {
    pub error: ErrorDetailSchema,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorDetailSchema {
    /// Machine-readable code
    #[schema(example = "INVALID_STATE")]
    pub code: String,
    pub message: String,
}
