//! Federation peers: per-site health and the sync loop that owns it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::StatusCache;
use crate::error::{EngineError, ScrapeError};
use crate::scraper::{ScrapeContext, ScraperRegistry};
use crate::shutdown::StopSignal;
use crate::source::{Source, SourceConfig};

#[derive(Debug, Clone, Default)]
struct SiteHealth {
    error_count: u64,
    last_error: Option<String>,
    last_sync: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    apps: usize,
}

/// Point-in-time view of a site, safe to expose: the token is left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteReport {
    pub name: String,
    pub url: String,
    pub enabled: bool,
    #[serde(with = "sitewatch_core::serde_utils::duration")]
    pub interval: Duration,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub apps: usize,
}

impl SiteReport {
    /// Disabled, never tried, or the last attempt succeeded.
    pub fn is_healthy(&self) -> bool {
        !self.enabled || self.last_attempt.is_none() || self.last_attempt == self.last_sync
    }
}

/// A federation peer. Health is written only by the site's own sync loop.
pub struct Site {
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
    source: Arc<Source>,
    health: RwLock<SiteHealth>,
}

impl Site {
    fn from_source(source: Arc<Source>, ctx: &ScrapeContext) -> Option<Self> {
        let SourceConfig::Site(config) = &source.config else {
            return None;
        };
        Some(Self {
            name: source.name.clone(),
            url: config.url.clone(),
            enabled: config.enabled,
            interval: config.interval.unwrap_or(ctx.settings.scrape_interval),
            timeout: config.timeout.unwrap_or(ctx.timeout),
            source: source.clone(),
            health: RwLock::new(SiteHealth::default()),
        })
    }

    pub fn report(&self) -> SiteReport {
        let health = self.health.read();
        SiteReport {
            name: self.name.clone(),
            url: self.url.clone(),
            enabled: self.enabled,
            interval: self.interval,
            error_count: health.error_count,
            last_error: health.last_error.clone(),
            last_sync: health.last_sync,
            last_attempt: health.last_attempt,
            apps: health.apps,
        }
    }

    fn record_success(&self, at: DateTime<Utc>, apps: usize) {
        let mut health = self.health.write();
        health.last_attempt = Some(at);
        health.last_sync = Some(at);
        health.apps = apps;
    }

    fn record_failure(&self, at: DateTime<Utc>, err: &ScrapeError) {
        let mut health = self.health.write();
        health.last_attempt = Some(at);
        health.error_count += 1;
        health.last_error = Some(err.to_string());
    }
}

/// All configured sites by name.
#[derive(Default)]
pub struct SiteRegistry {
    sites: BTreeMap<String, Arc<Site>>,
}

impl SiteRegistry {
    /// Builds sites from the site sources in `sources`, skipping any that
    /// would claim the local origin.
    pub fn from_sources(sources: &[Arc<Source>], ctx: &ScrapeContext) -> Self {
        let mut sites = BTreeMap::new();
        for source in sources.iter().filter(|source| source.is_site()) {
            if source.name == ctx.origin {
                warn!(site = %source.name, "site name equals the local instance name; skipping");
                continue;
            }
            if let Some(site) = Site::from_source(source.clone(), ctx) {
                sites.insert(site.name.clone(), Arc::new(site));
            }
        }
        Self { sites }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Site>> {
        self.sites.get(name).cloned()
    }

    pub fn sites(&self) -> impl Iterator<Item = &Arc<Site>> {
        self.sites.values()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn reports(&self) -> Vec<SiteReport> {
        self.sites.values().map(|site| site.report()).collect()
    }
}

/// Pulls one site and merges the result. On failure the cached entries of
/// the site are kept and only its health changes.
pub async fn sync_site(
    site: &Site,
    registry: &ScraperRegistry,
    cache: &StatusCache,
    ctx: &ScrapeContext,
) -> Result<usize, EngineError> {
    let ctx = ctx.clone().with_timeout(site.timeout);
    let attempted = Utc::now();
    let outcome = match time::timeout(site.timeout, registry.scrape(&site.source, &ctx)).await {
        Ok(result) => result,
        Err(_) => Err(ScrapeError::Timeout(site.timeout)),
    };

    match outcome {
        Ok(output) => {
            let stored = cache.replace_origin(&site.name, output.apps);
            site.record_success(attempted, stored);
            debug!(site = %site.name, stored, "site synced");
            Ok(stored)
        }
        Err(err) => {
            warn!(site = %site.name, url = %site.url, error = %err, "site sync failed");
            site.record_failure(attempted, &err);
            Err(err.into())
        }
    }
}

/// Syncs `site` on its own interval until `stop` fires.
pub async fn run_site_loop(
    site: Arc<Site>,
    registry: Arc<ScraperRegistry>,
    cache: StatusCache,
    ctx: ScrapeContext,
    stop: StopSignal,
) {
    info!(site = %site.name, url = %site.url, interval = ?site.interval, "site sync loop started");
    let mut ticker = time::interval(site.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = stop.wait() => break,
            _ = ticker.tick() => {
                let _ = sync_site(&site, &registry, &cache, &ctx).await;
            }
        }
    }
    info!(site = %site.name, "site sync loop stopped");
}
