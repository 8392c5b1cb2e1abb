//! Transfer endpoints for the local observer

use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use tracing::info;

use crate::api::AppState;
use crate::error::{AppError, AppResult};
use crate::models::Transfer;

/// File part of a multipart body
pub(crate) struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Split a multipart body into its `file` part and plain text fields
pub(crate) async fn read_multipart(
    mut multipart: Multipart,
) -> AppResult<(Option<UploadedFile>, HashMap<String, String>)> {
    let mut file = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read file: {}", e)))?;
            file = Some(UploadedFile {
                filename,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read {}: {}", name, e)))?;
            fields.insert(name, value);
        }
    }

    Ok((file, fields))
}

/// List this node's transfers, newest first
#[utoipa::path(
    get,
    path = "/api/transfers",
    tag = "transfers",
    responses(
        (status = 200, description = "Transfers", body = Vec<Transfer>),
    )
)]
pub async fn list(State(state): State<AppState>) -> Json<Vec<Transfer>> {
    Json(state.transfers.list().await)
}

/// Get one transfer
#[utoipa::path(
    get,
    path = "/api/transfers/{id}",
    tag = "transfers",
    params(("id" = String, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Transfer", body = Transfer),
        (status = 404, description = "Unknown transfer"),
    )
)]
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Transfer>> {
    Ok(Json(state.transfers.get(&id).await?))
}

/// Start sending a file.
///
/// Multipart fields: `file`, and `target` holding an address or a peer's
/// display name.
#[utoipa::path(
    post,
    path = "/api/send",
    tag = "transfers",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Offer delivered; transfer pending", body = Transfer),
        (status = 400, description = "Missing file or target"),
        (status = 404, description = "No peer with that name"),
        (status = 502, description = "Receiver unreachable; transfer left pending"),
    )
)]
pub async fn send(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<Transfer>> {
    let (file, fields) = read_multipart(multipart).await?;
    let file = file.ok_or_else(|| AppError::bad_request("Missing file"))?;
    let target = fields
        .get("target")
        .or_else(|| fields.get("targetIP"))
        .ok_or_else(|| AppError::bad_request("Target required"))?;

    info!(filename = %file.filename, size = file.bytes.len(), %target, "Send requested");
    let transfer = state
        .transfers
        .initiate(&file.filename, file.bytes, target)
        .await?;

    Ok(Json(transfer))
}

/// Accept an incoming transfer
#[utoipa::path(
    post,
    path = "/api/accept/{id}",
    tag = "transfers",
    params(("id" = String, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Accepted; sender asked to push", body = Transfer),
        (status = 404, description = "Unknown transfer"),
        (status = 409, description = "Transfer is not pending"),
        (status = 502, description = "Accepted locally but sender unreachable"),
    )
)]
pub async fn accept(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Transfer>> {
    Ok(Json(state.transfers.accept(&id).await?))
}

/// Reject an incoming transfer
#[utoipa::path(
    post,
    path = "/api/reject/{id}",
    tag = "transfers",
    params(("id" = String, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Rejected", body = Transfer),
        (status = 404, description = "Unknown transfer"),
        (status = 409, description = "Transfer is not pending"),
    )
)]
pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Transfer>> {
    Ok(Json(state.transfers.reject(&id).await?))
}

/// Download the file of a completed incoming transfer
#[utoipa::path(
    get,
    path = "/api/download/{id}",
    tag = "transfers",
    params(("id" = String, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "File bytes", body = String, content_type = "application/octet-stream"),
        (status = 404, description = "Unknown transfer or file gone"),
        (status = 409, description = "Transfer not completed"),
    )
)]
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let (transfer, bytes) = state.transfers.download(&id).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        transfer.filename.replace('"', "")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}
