use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sitewatch_core::{AppStatus, Config, Labels, Status};
use sitewatch_engine::{EngineHandle, ScraperRegistry, StatusEngine};

/// Engine handle over a seeded cache, with the given server settings.
///
/// Seeded apps: `api` (up, env=prod, team=a) and `db` (down, env=prod,
/// team=b) in paris, `web` (up, env=staging) in tokyo.
pub fn engine_with(settings: Value) -> EngineHandle {
    let mut settings = settings;
    settings["roles"] = json!({
        "prod-viewer": {"env": "prod"},
        "staging-viewer": {"env": "staging"}
    });
    let config: Config = serde_json::from_value(json!({
        "locations": [
            {"name": "paris", "latitude": 48.85, "longitude": 2.35},
            {"name": "tokyo", "latitude": 35.68, "longitude": 139.69},
            {"name": "lima", "latitude": -12.04, "longitude": -77.04}
        ],
        "server_settings": settings
    }))
    .unwrap();

    let engine = StatusEngine::from_config(&config, ScraperRegistry::with_defaults()).unwrap();
    let handle = engine.handle();
    let origin = handle.origin().to_string();
    let labelled = |name: &str, location: &str, status: Status, labels: &[(&str, &str)]| {
        AppStatus::new(name, location, status, &origin, "prom").with_labels(
            labels
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect::<Labels>(),
        )
    };
    handle.cache().replace_source(
        &origin,
        "prom",
        vec![
            labelled("api", "paris", Status::Up, &[("env", "prod"), ("team", "a")]),
            labelled("db", "paris", Status::Down, &[("env", "prod"), ("team", "b")]),
            labelled("web", "tokyo", Status::Up, &[("env", "staging")]),
        ],
    );
    handle
}

pub async fn read_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
