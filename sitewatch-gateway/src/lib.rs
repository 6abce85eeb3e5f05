pub mod api_routes;
pub mod config;
pub mod health;
pub mod routing;
pub mod security;
pub mod sync_routes;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;

use anyhow::Context;
use sitewatch_engine::EngineHandle;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

use config::GatewayConfig;
use routing::build_app;

/// Handle returned when the gateway is started programmatically.
pub struct GatewayHandle {
    pub addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
}

impl GatewayHandle {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn shutdown(self) {
        let _ = self.shutdown.send(());
    }
}

/// Binds `config.bind_address` and serves `engine` in the background.
pub async fn start_gateway(
    engine: EngineHandle,
    config: GatewayConfig,
) -> anyhow::Result<GatewayHandle> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("invalid gateway bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind gateway listener")?;
    serve_listener(listener, engine, config)
}

/// Serves `engine` on an already bound listener, for callers that need the
/// address before the engine exists.
pub fn serve_listener(
    listener: TcpListener,
    engine: EngineHandle,
    config: GatewayConfig,
) -> anyhow::Result<GatewayHandle> {
    let actual_addr = listener
        .local_addr()
        .context("failed to read socket address")?;
    let router = build_app(engine, &config);
    info!(%actual_addr, "starting sitewatch gateway");

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await
            .ok();
    });

    Ok(GatewayHandle {
        addr: actual_addr,
        shutdown: tx,
    })
}
