//! Pulls a peer instance's `/sync` map and re-tags it with the peer's name.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sitewatch_core::model::merge_labels;
use sitewatch_core::{AppStatus, RawSource};
use sitewatch_protocol::prelude::*;
use tracing::{debug, warn};

use super::{ScrapeContext, ScrapeOutput, Scraper};
use crate::error::ScrapeError;
use crate::source::{decode_config, require_url, Source, SourceConfig};

pub const KIND: &str = "site";

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, with = "sitewatch_core::serde_utils::option_duration")]
    pub interval: Option<Duration>,
    #[serde(default, with = "sitewatch_core::serde_utils::option_duration")]
    pub timeout: Option<Duration>,
}

impl SiteConfig {
    pub fn token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

pub struct SiteScraper {
    client: reqwest::Client,
}

impl SiteScraper {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, config: &SiteConfig, timeout: Duration) -> Result<SyncResponse, ScrapeError> {
        let mut request = self.client.get(sync_url(&config.url)).timeout(timeout);
        if let Some(token) = config.token() {
            let signed = sign_request(token, b"", Utc::now())?;
            request = request
                .header(TIMESTAMP_HEADER, signed.timestamp)
                .header(SIGNATURE_HEADER, signed.signature);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| ScrapeError::Decode(err.to_string()))
    }
}

/// Converts a peer's map into local records owned by `site`.
///
/// Entries the peer relayed from us are dropped. Entries the peer produced
/// itself are kept even when it reports them under our own name. When two
/// entries collapse onto the same key, the one the peer produced itself wins.
pub fn ingest(site: &Source, local_origin: &str, response: SyncResponse) -> Vec<AppStatus> {
    let mut clashes = 0usize;
    let mut entries: Vec<SyncEntry> = response
        .into_values()
        .filter(|entry| {
            if entry.app.origin != local_origin {
                return true;
            }
            if entry.sync_enabled {
                clashes += 1;
            }
            entry.sync_enabled
        })
        .collect();
    if clashes > 0 {
        warn!(
            site = %site.name,
            origin = %local_origin,
            clashes,
            "peer reports its own statuses under this instance's name; set distinct server_settings.name values"
        );
    }
    entries.sort_by_key(|entry| entry.sync_enabled);

    let mut by_key = std::collections::BTreeMap::new();
    for entry in entries {
        let mut app = entry.app;
        app.origin = site.name.clone();
        app.labels = merge_labels(&site.labels, &app.labels);
        by_key.insert(app.key(), app);
    }
    by_key.into_values().collect()
}

#[async_trait]
impl Scraper for SiteScraper {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn validate_config(&self, raw: &RawSource) -> Result<SourceConfig, ScrapeError> {
        let config: SiteConfig = decode_config(raw)?;
        require_url(&raw.name, "url", &config.url)?;
        if config.interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ScrapeError::invalid(&raw.name, "interval must be positive"));
        }
        if config.timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ScrapeError::invalid(&raw.name, "timeout must be positive"));
        }
        Ok(SourceConfig::Site(config))
    }

    async fn scrape(
        &self,
        source: &Source,
        ctx: &ScrapeContext,
    ) -> Result<ScrapeOutput, ScrapeError> {
        let SourceConfig::Site(config) = &source.config else {
            return Err(ScrapeError::KindMismatch {
                source_name: source.name.clone(),
                expected: KIND,
            });
        };

        let timeout = config.timeout.unwrap_or(ctx.timeout);
        let response = self.fetch(config, timeout).await?;
        let received = response.len();
        let apps = ingest(source, &ctx.origin, response);
        debug!(site = %source.name, received, kept = apps.len(), "site sync decoded");
        Ok(ScrapeOutput::from_apps(apps))
    }
}
