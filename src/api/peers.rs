use axum::{extract::State, Json};
use tracing::info;

use crate::api::AppState;
use crate::error::AppResult;
use crate::models::{Peer, ProbeRequest};

/// List peers currently online
#[utoipa::path(
    get,
    path = "/api/peers",
    tag = "peers",
    responses(
        (status = 200, description = "Online peers", body = Vec<Peer>),
    )
)]
pub async fn list(State(state): State<AppState>) -> Json<Vec<Peer>> {
    let mut peers = state.registry.list_online().await;
    peers.sort_by(|a, b| a.display_name.cmp(&b.display_name));
    Json(peers)
}

/// Probe one address now and register it if it answers
#[utoipa::path(
    post,
    path = "/api/peers/probe",
    tag = "peers",
    request_body = ProbeRequest,
    responses(
        (status = 200, description = "Peer found", body = Peer),
        (status = 400, description = "Invalid address"),
        (status = 502, description = "Nothing answered"),
    )
)]
pub async fn probe(
    State(state): State<AppState>,
    Json(req): Json<ProbeRequest>,
) -> AppResult<Json<Peer>> {
    info!("On-demand probe of {}", req.address);
    let peer = state.discovery.probe_address(&req.address).await?;
    Ok(Json(peer))
}
