use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use sitewatch_access::UserPermissions;
use sitewatch_core::Labels;
use sitewatch_protocol::prelude::*;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{debug, warn};

use crate::config::SecurityConfig;

pub const SERVICE_TOKEN_HEADER: &str = "X-Service-Token";
pub const ROLES_HEADER: &str = "X-User-Roles";
pub const ADMIN_HEADER: &str = "X-User-Admin";

/// Caller identity as asserted by the upstream authenticator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub roles: Vec<String>,
    pub is_admin: bool,
}

impl CallerContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let roles = header_str(headers, ROLES_HEADER)
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let is_admin = header_str(headers, ADMIN_HEADER)
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self { roles, is_admin }
    }

    /// Resolves roles fresh against the configured role table.
    pub fn permissions(&self, roles: &BTreeMap<String, Labels>) -> UserPermissions {
        if self.is_admin {
            UserPermissions::admin()
        } else {
            UserPermissions::from_roles(roles, self.roles.as_slice())
        }
    }
}

#[derive(Clone)]
pub struct SecurityState {
    config: SecurityConfig,
}

impl SecurityState {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    pub fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<_> = self
            .config
            .cors_allowed_origins
            .iter()
            .filter(|origin| origin.as_str() != "*")
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(%origin, ?err, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        let allow_origin = if origins.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_methods(AllowMethods::list([Method::GET, Method::OPTIONS]))
            .allow_origin(allow_origin)
            .allow_headers(AllowHeaders::list([
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::ORIGIN,
            ]))
    }

    pub fn max_concurrent_requests(&self) -> usize {
        self.config.max_concurrent_requests
    }

    /// Checks the shared service token, when one is configured.
    pub fn check_service_token(&self, headers: &HeaderMap) -> Result<(), SecurityError> {
        let Some(expected) = self.config.service_token.as_deref() else {
            return Ok(());
        };
        let provided = header_str(headers, SERVICE_TOKEN_HEADER)
            .ok_or(SecurityError::MissingServiceToken)?;
        if bool::from(provided.trim().as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(SecurityError::InvalidServiceToken)
        }
    }
}

/// Rejects `/api` requests without a valid service token and attaches the
/// caller's identity for the handlers.
pub async fn resolve_caller(
    State(state): State<Arc<SecurityState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    if let Err(err) = state.check_service_token(request.headers()) {
        warn!(reason = %err, path = %request.uri().path(), "rejecting api request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let caller = CallerContext::from_headers(request.headers());
    debug!(roles = ?caller.roles, admin = caller.is_admin, "caller resolved");
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// Validates the signature headers of a `/sync` request against `token`.
pub fn verify_sync_request(
    token: &str,
    headers: &HeaderMap,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<(), SecurityError> {
    validate_request(
        token,
        header_str(headers, TIMESTAMP_HEADER),
        body,
        header_str(headers, SIGNATURE_HEADER),
        now,
    )
    .map_err(SecurityError::Signature)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("missing service token")]
    MissingServiceToken,
    #[error("invalid service token")]
    InvalidServiceToken,
    #[error("sync request rejected: {0}")]
    Signature(#[from] SignatureError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn reads_caller_headers() {
        let caller = CallerContext::from_headers(&headers(&[
            ("x-user-roles", "prod-viewer  team-a"),
            ("x-user-admin", "false"),
        ]));
        assert_eq!(caller.roles, vec!["prod-viewer", "team-a"]);
        assert!(!caller.is_admin);

        let admin = CallerContext::from_headers(&headers(&[("x-user-admin", "TRUE")]));
        assert!(admin.permissions(&BTreeMap::new()).is_admin);
    }

    #[test]
    fn service_token_is_optional_until_configured() {
        let open = SecurityState::new(SecurityConfig::default());
        assert!(open.check_service_token(&HeaderMap::new()).is_ok());

        let locked = SecurityState::new(SecurityConfig {
            service_token: Some("svc".into()),
            ..SecurityConfig::default()
        });
        assert!(matches!(
            locked.check_service_token(&HeaderMap::new()),
            Err(SecurityError::MissingServiceToken)
        ));
        assert!(matches!(
            locked.check_service_token(&headers(&[("x-service-token", "nope")])),
            Err(SecurityError::InvalidServiceToken)
        ));
        assert!(locked
            .check_service_token(&headers(&[("x-service-token", "svc")]))
            .is_ok());
    }

    #[test]
    fn service_token_rejects_prefix_and_length_mismatch() {
        let locked = SecurityState::new(SecurityConfig {
            service_token: Some("svc-token".into()),
            ..SecurityConfig::default()
        });
        for candidate in ["svc", "svc-token-extra", "SVC-TOKEN", ""] {
            assert!(
                matches!(
                    locked.check_service_token(&headers(&[("x-service-token", candidate)])),
                    Err(SecurityError::InvalidServiceToken)
                ),
                "{candidate:?}"
            );
        }
        assert!(locked
            .check_service_token(&headers(&[("x-service-token", " svc-token ")]))
            .is_ok());
    }

    #[test]
    fn verifies_signed_sync_headers() {
        let now = Utc::now();
        let signed = sign_request("secret", b"", now).unwrap();
        let good = headers(&[
            ("x-site-sync-timestamp", signed.timestamp.as_str()),
            ("x-site-sync-signature", signed.signature.as_str()),
        ]);
        assert!(verify_sync_request("secret", &good, b"", now).is_ok());
        assert!(verify_sync_request("other", &good, b"", now).is_err());
        assert!(verify_sync_request("secret", &HeaderMap::new(), b"", now).is_err());
    }
}
