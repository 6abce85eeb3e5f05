use std::net::SocketAddr;

use anyhow::Context;
use sitewatch_core::config::Environment;
use sitewatch_core::Config;
use sitewatch_engine::{ScraperRegistry, StatusEngine};
use sitewatch_gateway::config::GatewayConfig;
use sitewatch_gateway::routing::build_app;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = GatewayConfig::from_env().context("failed to load process settings")?;

    if let Err(err) = sitewatch_core::logging::init_tracing(config.log_level.as_deref(), config.log_format) {
        eprintln!("failed to initialise tracing: {err}");
    }

    let document = Config::load(&config.config_path).with_context(|| {
        format!("failed to load configuration from {}", config.config_path.display())
    })?;

    if config.environment == Environment::Production && config.security.service_token.is_none() {
        warn!("SITEWATCH_SERVICE_TOKEN not set; caller identity headers are trusted as-is");
    }

    let mut engine = StatusEngine::from_config(&document, ScraperRegistry::with_defaults())
        .context("failed to build status engine")?;
    engine.start().context("failed to start status engine")?;

    let app = build_app(engine.handle(), &config);
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;
    let actual_addr = listener
        .local_addr()
        .context("failed to read socket address")?;
    info!(%actual_addr, config = %config.config_path.display(), "starting sitewatch");

    if let Err(err) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(?err, "http server terminated with error");
    }

    engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sigterm) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
