//! Source scrapers and the registry that dispatches on a source's type tag.

pub mod http;
pub mod prometheus;
pub mod site;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use sitewatch_core::{AppStatus, Location, RawSource, ServerSettings};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::ScrapeError;
use crate::source::{Source, SourceConfig};

/// Everything a scraper needs besides the source itself.
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    pub settings: Arc<ServerSettings>,
    /// Origin stamped on locally produced statuses.
    pub origin: String,
    pub timeout: Duration,
    pub max_parallel: usize,
}

impl ScrapeContext {
    pub fn new(settings: Arc<ServerSettings>, origin: impl Into<String>) -> Self {
        let timeout = settings.scrape_timeout;
        let max_parallel = settings.max_parallel;
        Self {
            settings,
            origin: origin.into(),
            timeout,
            max_parallel,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of scraping one source.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOutput {
    pub apps: Vec<AppStatus>,
    pub locations: Vec<Location>,
}

impl ScrapeOutput {
    pub fn from_apps(apps: Vec<AppStatus>) -> Self {
        Self {
            apps,
            locations: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Scraper: Send + Sync + 'static {
    /// Type tag this scraper handles, as written in `sources[].type`.
    fn kind(&self) -> &'static str;

    /// Decodes and checks the source's payload.
    fn validate_config(&self, raw: &RawSource) -> Result<SourceConfig, ScrapeError>;

    async fn scrape(&self, source: &Source, ctx: &ScrapeContext)
        -> Result<ScrapeOutput, ScrapeError>;
}

/// Scrapers keyed by type tag.
#[derive(Clone, Default)]
pub struct ScraperRegistry {
    scrapers: HashMap<&'static str, Arc<dyn Scraper>>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the prometheus, http and site scrapers.
    pub fn with_defaults() -> Self {
        let client = reqwest::Client::new();
        let mut registry = Self::new();
        registry.register(Arc::new(prometheus::PrometheusScraper::new(client.clone())));
        registry.register(Arc::new(http::HttpScraper::new()));
        registry.register(Arc::new(site::SiteScraper::new(client)));
        registry
    }

    pub fn register(&mut self, scraper: Arc<dyn Scraper>) {
        self.scrapers.insert(scraper.kind(), scraper);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Scraper>> {
        self.scrapers.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.scrapers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn validate(&self, raw: &RawSource) -> Result<Source, ScrapeError> {
        let scraper = self
            .get(&raw.kind)
            .ok_or_else(|| ScrapeError::UnknownKind(raw.kind.clone()))?;
        if raw.name.trim().is_empty() {
            return Err(ScrapeError::invalid(&raw.name, "source name must not be empty"));
        }
        let config = scraper.validate_config(raw)?;
        Ok(Source {
            name: raw.name.clone(),
            labels: raw.labels.clone(),
            config,
        })
    }

    /// Validates every source, skipping the broken ones.
    pub fn validate_all(&self, raws: &[RawSource]) -> Vec<Source> {
        raws.iter()
            .filter_map(|raw| match self.validate(raw) {
                Ok(source) => Some(source),
                Err(err) => {
                    warn!(source = %raw.name, kind = %raw.kind, error = %err, "skipping invalid source");
                    None
                }
            })
            .collect()
    }

    pub async fn scrape(
        &self,
        source: &Source,
        ctx: &ScrapeContext,
    ) -> Result<ScrapeOutput, ScrapeError> {
        let scraper = self
            .get(source.kind())
            .ok_or_else(|| ScrapeError::UnknownKind(source.kind().to_string()))?;
        scraper.scrape(source, ctx).await
    }
}

/// Runs `check` for every item with at most `max_parallel` in flight and
/// returns the results in input order.
pub(crate) async fn run_bounded<T, F, Fut>(items: Vec<T>, max_parallel: usize, check: F) -> Vec<AppStatus>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = AppStatus>,
{
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let check = &check;
    join_all(items.into_iter().map(|item| {
        let semaphore = semaphore.clone();
        async move {
            let _permit = semaphore.acquire().await.ok();
            check(item).await
        }
    }))
    .await
}
