use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use sitewatch_engine::EngineHandle;
use sitewatch_protocol::sync::SYNC_PATH;
use tracing::{debug, warn};

use crate::security::verify_sync_request;

pub fn router(engine: EngineHandle) -> Router {
    Router::new()
        .route(SYNC_PATH, get(sync))
        .with_state(engine)
}

/// Serves the whole cache to peers. Hidden unless sync is enabled; signed
/// requests are required once a token is configured.
async fn sync(State(engine): State<EngineHandle>, headers: HeaderMap) -> Response {
    let settings = engine.settings();
    if !settings.sync_enable {
        return StatusCode::NOT_FOUND.into_response();
    }

    if let Some(token) = settings.sync_token() {
        if let Err(err) = verify_sync_request(token, &headers, b"", Utc::now()) {
            warn!(reason = %err, "rejecting sync request");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let payload = engine.cache().sync_payload();
    debug!(entries = payload.len(), "serving sync payload");
    Json(payload).into_response()
}
