use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use sitewatch_access::{filtered_apps, filtered_labels, filtered_locations, AppQuery, UserPermissions};
use sitewatch_engine::EngineHandle;

use crate::security::{resolve_caller, CallerContext, SecurityState};

pub fn router(engine: EngineHandle, security: Arc<SecurityState>) -> Router {
    Router::new()
        .route("/api/apps", get(list_apps))
        .route("/api/locations", get(list_locations))
        .route("/api/labels", get(list_labels))
        .route_layer(middleware::from_fn_with_state(security, resolve_caller))
        .with_state(engine)
}

fn permissions(engine: &EngineHandle, caller: &CallerContext) -> UserPermissions {
    caller.permissions(&engine.settings().roles)
}

/// `?status=up|down` and repeated `?label=key:value`.
async fn list_apps(
    State(engine): State<EngineHandle>,
    Extension(caller): Extension<CallerContext>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let status = params
        .iter()
        .find(|(key, _)| key == "status")
        .map(|(_, value)| value.as_str());
    let labels: Vec<&str> = params
        .iter()
        .filter(|(key, _)| key == "label")
        .map(|(_, value)| value.as_str())
        .collect();

    let query = match AppQuery::parse(status, labels.as_slice()) {
        Ok(query) => query,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    };

    let perms = permissions(&engine, &caller);
    Json(filtered_apps(&engine.cache().apps(), &perms, &query)).into_response()
}

async fn list_locations(
    State(engine): State<EngineHandle>,
    Extension(caller): Extension<CallerContext>,
) -> impl IntoResponse {
    let perms = permissions(&engine, &caller);
    let cache = engine.cache();
    Json(filtered_locations(&cache.locations(), &cache.apps(), &perms))
}

async fn list_labels(
    State(engine): State<EngineHandle>,
    Extension(caller): Extension<CallerContext>,
) -> impl IntoResponse {
    let perms = permissions(&engine, &caller);
    Json(filtered_labels(&engine.cache().apps(), &perms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;
    use crate::test_support::{engine_with, read_json};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(service_token: Option<&str>) -> Router {
        let security = SecurityState::new(SecurityConfig {
            service_token: service_token.map(str::to_string),
            ..SecurityConfig::default()
        });
        router(engine_with(json!({"name": "node-a"})), Arc::new(security))
    }

    async fn get_json(router: Router, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        let mut builder = Request::get(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let response = router
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        if status.is_success() || status == StatusCode::BAD_REQUEST {
            (status, read_json(response).await)
        } else {
            (status, Value::Null)
        }
    }

    fn names(apps: &Value) -> Vec<String> {
        apps.as_array()
            .unwrap()
            .iter()
            .map(|app| app["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn apps_follow_roles_and_filters() {
        let (_, body) = get_json(app(None), "/api/apps", &[("x-user-roles", "prod-viewer")]).await;
        assert_eq!(names(&body), vec!["api", "db"]);

        let (_, body) = get_json(
            app(None),
            "/api/apps?status=up&label=team:a",
            &[("x-user-roles", "prod-viewer staging-viewer")],
        )
        .await;
        assert_eq!(names(&body), vec!["api"]);

        let (_, body) = get_json(app(None), "/api/apps", &[("x-user-admin", "true")]).await;
        assert_eq!(names(&body).len(), 3);
    }

    #[tokio::test]
    async fn anonymous_callers_see_nothing() {
        let (status, body) = get_json(app(None), "/api/apps", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());

        let (_, labels) = get_json(app(None), "/api/labels", &[]).await;
        assert!(labels.as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn locations_and_labels_are_filtered() {
        let viewer = [("x-user-roles", "staging-viewer")];
        let (_, locations) = get_json(app(None), "/api/locations", &viewer).await;
        let locations = locations.as_array().unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0]["name"], "tokyo");

        let (_, labels) = get_json(app(None), "/api/labels", &viewer).await;
        assert_eq!(labels, json!({"env": ["staging"]}));
    }

    #[tokio::test]
    async fn admins_see_unoccupied_locations() {
        let (_, locations) =
            get_json(app(None), "/api/locations", &[("x-user-admin", "true")]).await;
        let names: Vec<_> = locations
            .as_array()
            .unwrap()
            .iter()
            .map(|location| location["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"lima"), "{names:?}");
    }

    #[tokio::test]
    async fn rejects_bad_filters() {
        let (status, body) = get_json(app(None), "/api/apps?status=sideways", &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("sideways"));
    }

    #[tokio::test]
    async fn service_token_gates_the_api() {
        let (status, _) = get_json(app(Some("svc")), "/api/apps", &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = get_json(
            app(Some("svc")),
            "/api/apps",
            &[("x-service-token", "svc"), ("x-user-admin", "true")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
