//! Node-to-node RPC handlers
//!
//! Called by other nodes, never by the local observer.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use crate::api::transfers::read_multipart;
use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{Transfer, TransferFailure, TransferOffer};

/// Receive an offer from a sender
#[utoipa::path(
    post,
    path = "/api/notify-transfer",
    tag = "rpc",
    request_body = TransferOffer,
    responses(
        (status = 200, description = "Offer recorded (or already known)"),
        (status = 400, description = "Malformed offer"),
    )
)]
pub async fn notify_transfer(
    State(state): State<AppState>,
    Json(offer): Json<TransferOffer>,
) -> AppResult<Json<Value>> {
    let created = state.transfers.notify(offer).await?;
    let status = if created { "notified" } else { "duplicate" };
    Ok(Json(json!({ "status": status })))
}

/// Receiver accepted: push the staged bytes to it
#[utoipa::path(
    post,
    path = "/api/accept-remote/{id}",
    tag = "rpc",
    params(("id" = String, Path, description = "Transfer ID")),
    responses(
        (status = 202, description = "Push started", body = Transfer),
        (status = 404, description = "Unknown transfer"),
        (status = 409, description = "Transfer is not pending"),
    )
)]
pub async fn accept_remote(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<(StatusCode, Json<Transfer>)> {
    info!(transfer_id = %id, "Receiver accepted");
    let transfer = state.transfers.accept_remote(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(transfer)))
}

/// Receiver rejected: drop the staged bytes
#[utoipa::path(
    post,
    path = "/api/reject-remote/{id}",
    tag = "rpc",
    params(("id" = String, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Rejected", body = Transfer),
        (status = 404, description = "Unknown transfer"),
        (status = 409, description = "Transfer is not pending"),
    )
)]
pub async fn reject_remote(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Transfer>> {
    info!(transfer_id = %id, "Receiver rejected");
    Ok(Json(state.transfers.reject_remote(&id).await?))
}

/// Sender gave up pushing the bytes of an accepted transfer
#[utoipa::path(
    post,
    path = "/api/transfer-failed/{id}",
    tag = "rpc",
    params(("id" = String, Path, description = "Transfer ID")),
    request_body = TransferFailure,
    responses(
        (status = 200, description = "Failure recorded", body = Transfer),
        (status = 404, description = "Unknown transfer"),
        (status = 409, description = "Transfer is not an accepted incoming one"),
    )
)]
pub async fn transfer_failed(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TransferFailure>,
) -> AppResult<Json<Transfer>> {
    Ok(Json(state.transfers.fail_remote(&id, req.reason).await?))
}

/// Bytes pushed by the sender of an accepted transfer
#[utoipa::path(
    post,
    path = "/api/upload/{id}",
    tag = "rpc",
    params(("id" = String, Path, description = "Transfer ID")),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Received; transfer completed"),
        (status = 400, description = "Missing file or size mismatch"),
        (status = 404, description = "Unknown transfer"),
        (status = 409, description = "Transfer is not accepted"),
    )
)]
pub async fn upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let (file, _) = read_multipart(multipart).await?;
    let file = file.ok_or_else(|| AppError::bad_request("File not found in form"))?;

    let transfer = state.transfers.receive_upload(&id, file.bytes).await?;
    Ok(Json(json!({ "status": "received", "sizeBytes": transfer.size_bytes })))
}
