use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sitewatch_engine::{EngineHandle, SiteReport};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    origin: String,
    apps: usize,
    apps_up: usize,
    apps_down: usize,
    sites: Vec<SiteReport>,
}

pub fn router(engine: EngineHandle) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .with_state(engine)
}

/// Degraded while any enabled site's last sync attempt failed.
async fn healthz(State(engine): State<EngineHandle>) -> impl IntoResponse {
    let apps = engine.cache().apps();
    let apps_up = apps.iter().filter(|app| app.is_up()).count();
    let sites = engine.sites().reports();
    let healthy = sites.iter().all(SiteReport::is_healthy);

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        origin: engine.origin().to_string(),
        apps: apps.len(),
        apps_up,
        apps_down: apps.len() - apps_up,
        sites,
    })
}
