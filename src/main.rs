use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lanshare::{api::AppState, config::Config, create_router, node::Node};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting lanshare node");

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Configuration loaded");

    // Prometheus recorder for the metrics! macros
    let metrics = PrometheusBuilder::new().install_recorder()?;

    let node = Node::new(config.clone()).await?;
    tracing::info!(
        name = %node.identity.name,
        address = %node.identity.address,
        staging = %config.staging_dir.display(),
        inbox = %config.inbox_dir.display(),
        "Node initialized"
    );

    let handle = node.start();
    let state = AppState::new(&node).with_metrics(metrics);

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    handle.stop();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
