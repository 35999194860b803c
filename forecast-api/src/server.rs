use std::net::SocketAddr;

use anyhow::Context;
use forecast_core::{Config, service_from_config};
use tokio::net::TcpListener;

use crate::routes::{AppState, router};

/// Bind the configured port and serve until Ctrl-C.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let state = AppState::new(service_from_config(config), &config.rate_limit);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    let listener =
        TcpListener::bind(addr).await.with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(
        upstream = config.upstream.base_url(),
        rate_limit = config.rate_limit.max_requests,
        rate_limit_window_secs = config.rate_limit.window_secs,
        "Server running on http://localhost:{}",
        config.server.port
    );

    axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("got SIGINT, shutting down");
}
