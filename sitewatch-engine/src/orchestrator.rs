//! Periodic scrape cycle over every local (non-site) source.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::StatusCache;
use crate::error::ScrapeError;
use crate::scraper::{ScrapeContext, ScrapeOutput, ScraperRegistry};
use crate::shutdown::StopSignal;
use crate::source::Source;

/// Totals of one scrape cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sources: usize,
    pub failed_sources: usize,
    pub apps_up: usize,
    pub apps_down: usize,
    pub stored: usize,
}

pub struct Orchestrator {
    registry: Arc<ScraperRegistry>,
    cache: StatusCache,
    sources: Vec<Arc<Source>>,
    ctx: ScrapeContext,
}

impl Orchestrator {
    /// Site sources in `sources` are ignored; they run in their own loops.
    pub fn new(
        registry: Arc<ScraperRegistry>,
        cache: StatusCache,
        sources: Vec<Arc<Source>>,
        ctx: ScrapeContext,
    ) -> Self {
        let sources = sources.into_iter().filter(|source| !source.is_site()).collect();
        Self {
            registry,
            cache,
            sources,
            ctx,
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|source| source.name.clone()).collect()
    }

    /// Scrapes every source once, in parallel, and writes the results.
    pub async fn run_once(&self) -> CycleReport {
        let started = Instant::now();
        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let registry = self.registry.clone();
                let source = source.clone();
                let ctx = self.ctx.clone();
                tokio::spawn(async move { scrape_source(&registry, &source, &ctx).await })
            })
            .collect();

        let mut report = CycleReport {
            sources: self.sources.len(),
            ..CycleReport::default()
        };

        for (source, joined) in self.sources.iter().zip(join_all(handles).await) {
            let (output, failed) = match joined {
                Ok(result) => result,
                Err(err) => {
                    error!(source = %source.name, error = %err, "scrape task crashed");
                    (
                        ScrapeOutput::from_apps(
                            source.all_down(&self.ctx.origin, "scrape task crashed"),
                        ),
                        true,
                    )
                }
            };
            if !output.locations.is_empty() {
                self.cache.add_locations(output.locations);
            }
            let apps = output.apps;
            if failed {
                report.failed_sources += 1;
            }
            for app in &apps {
                if app.is_up() {
                    report.apps_up += 1;
                } else {
                    report.apps_down += 1;
                }
            }
            report.stored += self
                .cache
                .replace_source(&self.ctx.origin, &source.name, apps);
        }

        debug!(
            sources = report.sources,
            failed = report.failed_sources,
            up = report.apps_up,
            down = report.apps_down,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scrape cycle finished"
        );
        report
    }

    /// Runs a cycle on every interval tick until `stop` fires.
    pub async fn run(self: Arc<Self>, stop: StopSignal) {
        let interval = self.ctx.settings.scrape_interval;
        info!(sources = self.sources.len(), interval = ?interval, "scrape orchestrator started");

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.wait() => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
        info!("scrape orchestrator stopped");
    }
}

/// Scrapes one source under its deadline. Each app check is bounded by its
/// own timeout; a source that fails or overruns as a whole reports all of its
/// declared apps down, and the flag tells whether that happened.
async fn scrape_source(
    registry: &ScraperRegistry,
    source: &Source,
    ctx: &ScrapeContext,
) -> (ScrapeOutput, bool) {
    let deadline = source.deadline(ctx.timeout, ctx.max_parallel);
    let outcome = match time::timeout(deadline, registry.scrape(source, ctx)).await {
        Ok(result) => result,
        Err(_) => Err(ScrapeError::Timeout(deadline)),
    };
    match outcome {
        Ok(output) => (output, false),
        Err(err) => {
            warn!(source = %source.name, kind = source.kind(), error = %err, "source scrape failed");
            (
                ScrapeOutput::from_apps(source.all_down(&ctx.origin, &err.to_string())),
                true,
            )
        }
    }
}
