//! Passive responder: lets any node on the LAN find this one

use axum::{extract::State, Json};

use crate::api::AppState;
use crate::models::DeviceIdentity;

/// Answer a probe with this node's identity
#[utoipa::path(
    get,
    path = "/discover",
    tag = "discovery",
    responses(
        (status = 200, description = "Identity of this node", body = DeviceIdentity),
    )
)]
pub async fn discover(State(state): State<AppState>) -> Json<DeviceIdentity> {
    Json(state.identity.clone())
}

/// Identity of this node, for the local observer
#[utoipa::path(
    get,
    path = "/api/device-name",
    tag = "discovery",
    responses(
        (status = 200, description = "Identity of this node", body = DeviceIdentity),
    )
)]
pub async fn device_name(State(state): State<AppState>) -> Json<DeviceIdentity> {
    Json(state.identity.clone())
}
