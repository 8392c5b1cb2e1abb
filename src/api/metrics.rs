use axum::{extract::State, response::IntoResponse};

use crate::api::AppState;

/// Prometheus metrics endpoint
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "ops",
    responses(
        (status = 200, description = "Prometheus text exposition", body = String, content_type = "text/plain"),
    )
)]
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    // No recorder is installed in tests or embedded nodes
    let body = match &state.metrics {
        Some(handle) => handle.render(),
        None => format!(
            "# HELP lanshare_info lanshare node info\n\
             # TYPE lanshare_info gauge\n\
             lanshare_info{{version=\"{}\"}} 1\n",
            env!("CARGO_PKG_VERSION")
        ),
    };

    ([("content-type", "text/plain; charset=utf-8")], body)
}
