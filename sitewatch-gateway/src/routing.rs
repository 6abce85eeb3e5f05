use std::sync::Arc;

use axum::Router;
use sitewatch_engine::EngineHandle;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::security::SecurityState;
use crate::{api_routes, health, sync_routes};

/// Full HTTP surface over a running engine.
pub fn build_app(engine: EngineHandle, config: &GatewayConfig) -> Router {
    let security = Arc::new(SecurityState::new(config.security().clone()));

    Router::new()
        .merge(sync_routes::router(engine.clone()))
        .merge(api_routes::router(engine.clone(), security.clone()))
        .merge(health::router(engine))
        .layer(security.cors_layer())
        .layer(ConcurrencyLimitLayer::new(security.max_concurrent_requests()))
        .layer(TraceLayer::new_for_http())
}
