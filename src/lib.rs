//! lanshare
//!
//! Serverless LAN file sharing: every node discovers peers on its local
//! subnets, offers files to them and serves the same small HTTP API that
//! it calls on others.

pub mod api;
pub mod config;
pub mod discovery;
pub mod error;
pub mod hub;
pub mod models;
pub mod node;
pub mod peers;
pub mod staging;
pub mod transfer;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::openapi::ApiDoc;
use crate::api::AppState;

/// Create the application router with the given state
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    let cors = cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Discovery
        .route("/discover", get(api::discover::discover))
        .route("/api/device-name", get(api::discover::device_name))
        // Peer RPC
        .route("/api/notify-transfer", post(api::rpc::notify_transfer))
        .route("/api/accept-remote/:id", post(api::rpc::accept_remote))
        .route("/api/reject-remote/:id", post(api::rpc::reject_remote))
        .route("/api/transfer-failed/:id", post(api::rpc::transfer_failed))
        .route("/api/upload/:id", post(api::rpc::upload))
        // Peers
        .route("/api/peers", get(api::peers::list))
        .route("/api/peers/probe", post(api::peers::probe))
        // Transfers
        .route("/api/transfers", get(api::transfers::list))
        .route("/api/transfers/:id", get(api::transfers::get))
        .route("/api/send", post(api::transfers::send))
        .route("/api/accept/:id", post(api::transfers::accept))
        .route("/api/reject/:id", post(api::transfers::reject))
        .route("/api/download/:id", get(api::transfers::download))
        // WebSocket
        .route("/ws", get(api::ws::ws_handler))
        // Metrics (Prometheus)
        .route("/metrics", get(api::metrics::metrics_handler))
        // OpenAPI / Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // State and middleware
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Create CORS layer from a comma-separated origin list; `*` allows any
/// origin without credentials
fn cors_layer(allowed_origins: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if allowed_origins.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let origins: Vec<_> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}
