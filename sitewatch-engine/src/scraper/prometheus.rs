//! Prometheus instant-query scraper. An app is up when the first sample of
//! its query evaluates to `1`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sitewatch_core::{AppStatus, Labels, RawSource};
use tracing::{debug, warn};

use super::{run_bounded, ScrapeContext, ScrapeOutput, Scraper};
use crate::error::ScrapeError;
use crate::source::{decode_config, require, require_url, Source, SourceConfig};

pub const KIND: &str = "prometheus";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub apps: Vec<PrometheusApp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusApp {
    pub name: String,
    pub location: String,
    pub query: String,
    #[serde(default)]
    pub labels: Labels,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    result: Value,
}

pub struct PrometheusScraper {
    client: reqwest::Client,
}

impl PrometheusScraper {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn query(
        &self,
        config: &PrometheusConfig,
        app: &PrometheusApp,
        ctx: &ScrapeContext,
    ) -> Result<f64, ScrapeError> {
        let endpoint = format!("{}/api/v1/query", config.url.trim_end_matches('/'));
        let mut request = self
            .client
            .get(endpoint)
            .query(&[("query", app.query.as_str())])
            .timeout(ctx.timeout);

        if let Some(token) = config.token.as_deref().filter(|token| !token.is_empty()) {
            request = request.bearer_auth(token);
        } else if let Some(username) = config.username.as_deref() {
            request = request.basic_auth(username, config.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status(status.as_u16()));
        }
        let body: QueryResponse = response.json().await?;
        first_sample(body)
    }
}

/// Extracts the first sample value of a vector or scalar result.
fn first_sample(body: QueryResponse) -> Result<f64, ScrapeError> {
    if body.status != "success" {
        return Err(ScrapeError::Decode(
            body.error.unwrap_or_else(|| format!("query status {}", body.status)),
        ));
    }
    let data = body
        .data
        .ok_or_else(|| ScrapeError::Decode("response has no data".into()))?;

    let sample = match data.result_type.as_str() {
        "vector" => data
            .result
            .as_array()
            .and_then(|series| series.first())
            .and_then(|first| first.get("value"))
            .ok_or_else(|| ScrapeError::Decode("query returned no samples".into()))?,
        "scalar" => &data.result,
        other => {
            return Err(ScrapeError::Decode(format!(
                "unsupported result type {other}"
            )))
        }
    };

    sample
        .get(1)
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<f64>().ok())
        .ok_or_else(|| ScrapeError::Decode(format!("unreadable sample {sample}")))
}

#[async_trait]
impl Scraper for PrometheusScraper {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn validate_config(&self, raw: &RawSource) -> Result<SourceConfig, ScrapeError> {
        let config: PrometheusConfig = decode_config(raw)?;
        require_url(&raw.name, "url", &config.url)?;
        if config.password.is_some() && config.username.is_none() {
            return Err(ScrapeError::invalid(&raw.name, "password given without username"));
        }
        let mut seen = std::collections::HashSet::new();
        for app in &config.apps {
            require(&raw.name, "app name", &app.name)?;
            require(&raw.name, "app location", &app.location)?;
            require(&raw.name, "app query", &app.query)?;
            if !seen.insert(app.name.as_str()) {
                return Err(ScrapeError::invalid(
                    &raw.name,
                    format!("duplicate app {}", app.name),
                ));
            }
        }
        Ok(SourceConfig::Prometheus(config))
    }

    async fn scrape(
        &self,
        source: &Source,
        ctx: &ScrapeContext,
    ) -> Result<ScrapeOutput, ScrapeError> {
        let SourceConfig::Prometheus(config) = &source.config else {
            return Err(ScrapeError::KindMismatch {
                source_name: source.name.clone(),
                expected: KIND,
            });
        };

        let declared = source.declared_apps();
        let pairs: Vec<_> = config.apps.iter().zip(declared).collect();
        let apps = run_bounded(pairs, ctx.max_parallel, |(app, declared)| async move {
            let status = match self.query(config, app, ctx).await {
                Ok(value) if value == 1.0 => {
                    AppStatus::up(&app.name, &app.location, &ctx.origin, &source.name)
                }
                Ok(value) => AppStatus::down(
                    &app.name,
                    &app.location,
                    &ctx.origin,
                    &source.name,
                    format!("query returned {value}"),
                ),
                Err(err) => {
                    warn!(source = %source.name, app = %app.name, error = %err, "prometheus query failed");
                    AppStatus::down(
                        &app.name,
                        &app.location,
                        &ctx.origin,
                        &source.name,
                        err.to_string(),
                    )
                }
            };
            debug!(source = %source.name, app = %app.name, status = %status.status, "prometheus check");
            status.with_labels(declared.labels)
        })
        .await;

        Ok(ScrapeOutput::from_apps(apps))
    }
}
