use std::sync::Arc;

use anyhow::Context;

use canister_api::app;
use canister_api::config::Config;
use canister_api::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = Config::from_env();
    let (router, services) = app::build_app(&config).await;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(services))
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal(services: Arc<app::services::AppServices>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to install ctrl-c handler");
        return;
    }
    tracing::info!("shutdown signal received, stopping background workers");
    services.shutdown();
}
