//! Main entry point for the API gateway

use api_gateway::{
    api,
    backend::http_backend::HttpBackendClient,
    config::{LoggingConfig, Settings},
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    init_tracing(&settings.logging);
    info!(
        "Loaded configuration: server={}:{}, backends={}",
        settings.server.host,
        settings.server.port,
        settings.backends.len()
    );
    if settings.backends.is_empty() {
        warn!("No backends configured; proxied requests will be answered with 503");
    }

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let sweep_interval = Duration::from_secs(settings.rate_limit.sweep_interval_secs);

    let backend = Arc::new(HttpBackendClient::new(&settings)?);
    let app_state = Arc::new(AppState::new(settings, backend)?);

    // Establish initial health before accepting traffic
    let summary = app_state.health_prober.probe_all().await;
    info!(
        total = summary.total,
        healthy = summary.healthy,
        "Initial health probe completed"
    );

    app_state.health_prober.start().await;
    let sweeper = app_state.rate_limiter.clone().spawn_sweeper(sweep_interval);

    // Build the router
    let app = api::routes::create_router(app_state.clone());

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.health_prober.stop().await;
    sweeper.abort();
    info!("Gateway stopped");

    Ok(())
}
