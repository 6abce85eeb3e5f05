//! Direct HTTP health checks: one request per configured app, classified by
//! status code and optional content conditions.

pub mod codes;
pub mod validation;

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Method};
use serde::{Deserialize, Serialize};
use sitewatch_core::serde_utils;
use sitewatch_core::{AppStatus, Labels, RawSource};
use tracing::{debug, warn};

use self::codes::{classify, CodeList};
use self::validation::{check_all, ResponseFacts, ValidationCondition};
use super::{run_bounded, ScrapeContext, ScrapeOutput, Scraper};
use crate::error::ScrapeError;
use crate::source::{decode_config, require, require_url, Source, SourceConfig};

pub const KIND: &str = "http";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    pub apps: Vec<HttpApp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HttpAuth {
    Basic { username: String, password: String },
    Bearer { token: String },
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_redirects() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpApp {
    pub name: String,
    pub location: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub auth: Option<HttpAuth>,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "CodeList::allowed_default")]
    pub allowed_status_codes: CodeList,
    #[serde(default = "CodeList::blocked_default")]
    pub blocked_status_codes: CodeList,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    #[serde(default, with = "serde_utils::option_duration")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub validation: Vec<ValidationCondition>,
    /// Built once when the source is validated.
    #[serde(skip)]
    client: Option<reqwest::Client>,
}

impl HttpApp {
    fn method(&self) -> Result<Method, String> {
        Method::from_bytes(self.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| format!("invalid method {:?}", self.method))
    }

    fn header_map(&self) -> Result<HeaderMap, String> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| format!("invalid header name {name:?}"))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| format!("invalid value for header {name}"))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    /// Client honoring this app's redirect and TLS settings. Timeouts are set
    /// per request.
    fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        let policy = if self.follow_redirects {
            redirect::Policy::limited(self.max_redirects)
        } else {
            redirect::Policy::none()
        };
        reqwest::Client::builder()
            .redirect(policy)
            .danger_accept_invalid_certs(!self.verify_tls)
            .build()
    }

    fn client(&self) -> Result<reqwest::Client, String> {
        match &self.client {
            Some(client) => Ok(client.clone()),
            None => self.build_client().map_err(|err| err.to_string()),
        }
    }
}

#[derive(Default)]
pub struct HttpScraper;

impl HttpScraper {
    pub fn new() -> Self {
        Self
    }

    async fn check(&self, app: &HttpApp, ctx: &ScrapeContext) -> Result<u64, String> {
        let method = app.method()?;
        let headers = app.header_map()?;
        let client = app.client()?;

        let mut request = client
            .request(method, &app.url)
            .headers(headers)
            .timeout(app.timeout.unwrap_or(ctx.timeout));
        if let Some(body) = &app.body {
            request = request.body(body.clone());
        }
        request = match &app.auth {
            Some(HttpAuth::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            Some(HttpAuth::Bearer { token }) => request.bearer_auth(token),
            None => request,
        };

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|err| ScrapeError::from(err).to_string())?;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status = response.status().as_u16();

        classify(status, &app.allowed_status_codes, &app.blocked_status_codes)?;

        if !app.validation.is_empty() {
            let body = response
                .text()
                .await
                .map_err(|err| format!("reading body: {err}"))?;
            let facts = ResponseFacts {
                status,
                latency_ms,
                body: &body,
            };
            check_all(&app.validation, &facts)?;
        }
        Ok(latency_ms)
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn validate_config(&self, raw: &RawSource) -> Result<SourceConfig, ScrapeError> {
        let mut config: HttpConfig = decode_config(raw)?;
        let mut seen = HashSet::new();
        for app in &config.apps {
            require(&raw.name, "app name", &app.name)?;
            require(&raw.name, "app location", &app.location)?;
            require_url(&raw.name, "app url", &app.url)?;
            if !seen.insert(app.name.as_str()) {
                return Err(ScrapeError::invalid(
                    &raw.name,
                    format!("duplicate app {}", app.name),
                ));
            }
            let in_app = |message: String| {
                ScrapeError::invalid(&raw.name, format!("app {}: {message}", app.name))
            };
            app.method().map_err(in_app)?;
            app.header_map().map_err(in_app)?;
            if app.allowed_status_codes.is_empty() {
                return Err(in_app("allowed_status_codes must not be empty".into()));
            }
            if app.timeout.is_some_and(|timeout| timeout.is_zero()) {
                return Err(in_app("timeout must be positive".into()));
            }
            for condition in &app.validation {
                condition.validate().map_err(in_app)?;
            }
        }
        for app in &mut config.apps {
            let client = app.build_client().map_err(|err| {
                ScrapeError::invalid(&raw.name, format!("app {}: {err}", app.name))
            })?;
            app.client = Some(client);
        }
        Ok(SourceConfig::Http(config))
    }

    async fn scrape(
        &self,
        source: &Source,
        ctx: &ScrapeContext,
    ) -> Result<ScrapeOutput, ScrapeError> {
        let SourceConfig::Http(config) = &source.config else {
            return Err(ScrapeError::KindMismatch {
                source_name: source.name.clone(),
                expected: KIND,
            });
        };

        let declared = source.declared_apps();
        let pairs: Vec<_> = config.apps.iter().zip(declared).collect();
        let apps = run_bounded(pairs, ctx.max_parallel, |(app, declared)| async move {
            let status = match self.check(app, ctx).await {
                Ok(latency_ms) => {
                    let mut status =
                        AppStatus::up(&app.name, &app.location, &ctx.origin, &source.name);
                    status.latency_ms = Some(latency_ms);
                    status
                }
                Err(reason) => {
                    warn!(source = %source.name, app = %app.name, url = %app.url, error = %reason, "http check failed");
                    AppStatus::down(&app.name, &app.location, &ctx.origin, &source.name, reason)
                }
            };
            debug!(source = %source.name, app = %app.name, status = %status.status, "http check");
            status.with_labels(declared.labels)
        })
        .await;

        Ok(ScrapeOutput::from_apps(apps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use sitewatch_core::{ServerSettings, Status};
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(apps: Value) -> Source {
        let raw = RawSource {
            name: "checks".into(),
            kind: KIND.into(),
            labels: Labels::from([("env".into(), "prod".into())]),
            config: json!({ "apps": apps }),
        };
        Source {
            name: raw.name.clone(),
            labels: raw.labels.clone(),
            config: HttpScraper::new().validate_config(&raw).unwrap(),
        }
    }

    fn ctx() -> ScrapeContext {
        ScrapeContext::new(Arc::new(ServerSettings::default()), "self")
    }

    async fn scrape(apps: Value) -> Vec<AppStatus> {
        HttpScraper::new()
            .scrape(&source(apps), &ctx())
            .await
            .unwrap()
            .apps
    }

    #[tokio::test]
    async fn classifies_by_status_code() {
        let server = MockServer::start().await;
        Mock::given(path("/ok"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(path("/unavailable"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let apps = scrape(json!([
            {"name": "ok", "location": "paris", "url": format!("{}/ok", server.uri())},
            {"name": "busy", "location": "paris", "url": format!("{}/unavailable", server.uri()),
             "allowed_status_codes": ["2XX", "5XX"], "blocked_status_codes": ["5XX"]}
        ]))
        .await;

        assert_eq!(apps[0].status, Status::Up);
        assert!(apps[0].latency_ms.is_some());
        assert_eq!(apps[0].labels["env"], "prod");
        assert_eq!(apps[1].status, Status::Down);
        assert_eq!(apps[1].error.as_deref(), Some("status 503 is blocked"));
    }

    #[tokio::test]
    async fn applies_method_headers_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check"))
            .and(header("x-check", "1"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let apps = scrape(json!([{
            "name": "check",
            "location": "paris",
            "url": format!("{}/check", server.uri()),
            "method": "post",
            "headers": {"X-Check": "1"},
            "body": "{}",
            "auth": {"type": "bearer", "token": "abc"}
        }]))
        .await;
        assert_eq!(apps[0].status, Status::Up, "{:?}", apps[0].error);
    }

    #[tokio::test]
    async fn redirects_are_not_followed_when_disabled() {
        let server = MockServer::start().await;
        let target = format!("{}/new", server.uri());
        Mock::given(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", target.as_str()))
            .mount(&server)
            .await;
        Mock::given(path("/new"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let url = format!("{}/old", server.uri());
        let apps = scrape(json!([
            {"name": "follow", "location": "paris", "url": url},
            {"name": "stay", "location": "paris", "url": url, "follow_redirects": false}
        ]))
        .await;
        assert_eq!(apps[0].status, Status::Up);
        assert_eq!(apps[1].status, Status::Down);
    }

    #[tokio::test]
    async fn content_conditions_must_all_pass() {
        let server = MockServer::start().await;
        Mock::given(path("/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "degraded"})),
            )
            .mount(&server)
            .await;

        let url = format!("{}/health", server.uri());
        let apps = scrape(json!([
            {"name": "contains", "location": "paris", "url": url,
             "validation": [{"type": "body_contains", "text": "status"}]},
            {"name": "healthy", "location": "paris", "url": url,
             "validation": [
                {"type": "status_code", "operator": "equals", "value": 200},
                {"type": "json_path", "path": "status", "equals": "healthy"}
             ]}
        ]))
        .await;
        assert_eq!(apps[0].status, Status::Up);
        assert_eq!(apps[1].status, Status::Down);
        assert!(apps[1].error.as_deref().unwrap().contains("expected \"healthy\""));
    }

    #[tokio::test]
    async fn unreachable_target_is_down() {
        let apps = scrape(json!([
            {"name": "gone", "location": "paris", "url": "http://127.0.0.1:9", "timeout": "500ms"}
        ]))
        .await;
        assert_eq!(apps[0].status, Status::Down);
        assert!(apps[0].error.is_some());
    }

    #[test]
    fn rejects_invalid_app_settings() {
        let scraper = HttpScraper::new();
        for config in [
            json!({"apps": [{"name": "a", "location": "l", "url": "http://x", "allowed_status_codes": ["2X"]}]}),
            json!({"apps": [{"name": "a", "location": "l", "url": "http://x", "method": "GE T"}]}),
            json!({"apps": [{"name": "a", "location": "l", "url": "ftp://x"}]}),
            json!({"apps": [{"name": "a", "location": "l", "url": "http://x", "retries": 3}]}),
            json!({"apps": [
                {"name": "a", "location": "l", "url": "http://x"},
                {"name": "a", "location": "l", "url": "http://y"}
            ]}),
        ] {
            let raw = RawSource {
                name: "checks".into(),
                kind: KIND.into(),
                labels: Labels::new(),
                config: config.clone(),
            };
            assert!(scraper.validate_config(&raw).is_err(), "{config}");
        }
    }

    #[test]
    fn applies_documented_defaults() {
        let config: HttpConfig = serde_json::from_value(json!({
            "apps": [{"name": "a", "location": "l", "url": "http://x"}]
        }))
        .unwrap();
        let app = &config.apps[0];
        assert_eq!(app.method, "GET");
        assert!(app.follow_redirects);
        assert_eq!(app.max_redirects, 10);
        assert!(app.verify_tls);
        assert!(app.allowed_status_codes.matches(200));
        assert!(app.blocked_status_codes.matches(404));
        assert!(app.blocked_status_codes.matches(500));
    }

    #[test]
    fn validation_builds_one_client_per_app() {
        let validated = source(json!([
            {"name": "a", "location": "l", "url": "http://x"},
            {"name": "b", "location": "l", "url": "http://y", "verify_tls": false}
        ]));
        let SourceConfig::Http(config) = &validated.config else {
            panic!("expected http config");
        };
        assert!(config.apps.iter().all(|app| app.client.is_some()));
    }

    #[tokio::test]
    async fn per_app_timeout_overrides_source_timeout() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
            .mount(&server)
            .await;
        let url = format!("{}/slow", server.uri());
        let checks = source(json!([
            {"name": "strict", "location": "paris", "url": url, "timeout": "100ms"},
            {"name": "lenient", "location": "paris", "url": url, "timeout": "5s"}
        ]));

        let short = ctx().with_timeout(Duration::from_millis(200));
        let apps = HttpScraper::new().scrape(&checks, &short).await.unwrap().apps;
        assert_eq!(apps[0].status, Status::Down);
        assert_eq!(apps[1].status, Status::Up, "{:?}", apps[1].error);
    }
}
