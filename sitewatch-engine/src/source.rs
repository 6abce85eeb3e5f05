//! Validated sources: a configured source whose payload has been decoded by
//! the scraper registered for its type tag.

use std::time::Duration;

use serde::de::DeserializeOwned;
use sitewatch_core::model::merge_labels;
use sitewatch_core::{AppStatus, Labels, RawSource};

use crate::error::ScrapeError;
use crate::scraper::http::HttpConfig;
use crate::scraper::prometheus::PrometheusConfig;
use crate::scraper::site::SiteConfig;

/// Slack added on top of the slowest app check when bounding a whole source.
pub const DEADLINE_MARGIN: Duration = Duration::from_millis(500);

/// Type-specific payload of a source.
#[derive(Debug, Clone)]
pub enum SourceConfig {
    Prometheus(PrometheusConfig),
    Http(HttpConfig),
    Site(SiteConfig),
}

impl SourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Prometheus(_) => crate::scraper::prometheus::KIND,
            SourceConfig::Http(_) => crate::scraper::http::KIND,
            SourceConfig::Site(_) => crate::scraper::site::KIND,
        }
    }
}

/// An application a source is configured to report on.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredApp {
    pub name: String,
    pub location: String,
    pub labels: Labels,
}

#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub labels: Labels,
    pub config: SourceConfig,
}

impl Source {
    pub fn kind(&self) -> &'static str {
        self.config.kind()
    }

    pub fn is_site(&self) -> bool {
        matches!(self.config, SourceConfig::Site(_))
    }

    /// Apps named in the configuration. Sites declare none: their apps are
    /// whatever the peer reports.
    pub fn declared_apps(&self) -> Vec<DeclaredApp> {
        match &self.config {
            SourceConfig::Prometheus(config) => config
                .apps
                .iter()
                .map(|app| DeclaredApp {
                    name: app.name.clone(),
                    location: app.location.clone(),
                    labels: merge_labels(&self.labels, &app.labels),
                })
                .collect(),
            SourceConfig::Http(config) => config
                .apps
                .iter()
                .map(|app| DeclaredApp {
                    name: app.name.clone(),
                    location: app.location.clone(),
                    labels: merge_labels(&self.labels, &app.labels),
                })
                .collect(),
            SourceConfig::Site(_) => Vec::new(),
        }
    }

    /// Outer bound for one scrape of this source. Every app check carries its
    /// own timeout; this covers the slowest one for each wave of
    /// `max_parallel` checks, plus [`DEADLINE_MARGIN`].
    pub fn deadline(&self, default_timeout: Duration, max_parallel: usize) -> Duration {
        let (checks, slowest) = match &self.config {
            SourceConfig::Prometheus(config) => (config.apps.len(), default_timeout),
            SourceConfig::Http(config) => (
                config.apps.len(),
                config
                    .apps
                    .iter()
                    .map(|app| app.timeout.unwrap_or(default_timeout))
                    .max()
                    .unwrap_or(default_timeout),
            ),
            SourceConfig::Site(config) => (1, config.timeout.unwrap_or(default_timeout)),
        };
        let waves = checks.max(1).div_ceil(max_parallel.max(1));
        slowest
            .saturating_mul(u32::try_from(waves).unwrap_or(u32::MAX))
            .saturating_add(DEADLINE_MARGIN)
    }

    /// One down record per declared app, used when the whole source failed.
    pub fn all_down(&self, origin: &str, error: &str) -> Vec<AppStatus> {
        self.declared_apps()
            .into_iter()
            .map(|app| {
                AppStatus::down(app.name, app.location, origin, &self.name, error)
                    .with_labels(app.labels)
            })
            .collect()
    }
}

/// Decodes the free-form `config` payload of `raw` into a scraper's config type.
pub(crate) fn decode_config<T: DeserializeOwned>(raw: &RawSource) -> Result<T, ScrapeError> {
    if raw.config.is_null() {
        return Err(ScrapeError::invalid(&raw.name, "missing config"));
    }
    serde_json::from_value::<T>(raw.config.clone())
        .map_err(|err| ScrapeError::invalid(&raw.name, err.to_string()))
}

/// Rejects empty strings in required fields.
pub(crate) fn require(source: &str, field: &str, value: &str) -> Result<(), ScrapeError> {
    if value.trim().is_empty() {
        return Err(ScrapeError::invalid(source, format!("{field} must not be empty")));
    }
    Ok(())
}

/// Accepts only absolute http(s) URLs.
pub(crate) fn require_url(source: &str, field: &str, value: &str) -> Result<url::Url, ScrapeError> {
    let parsed = url::Url::parse(value)
        .map_err(|err| ScrapeError::invalid(source, format!("{field} {value:?}: {err}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ScrapeError::invalid(
            source,
            format!("{field} has unsupported scheme {other:?}"),
        )),
    }
}
