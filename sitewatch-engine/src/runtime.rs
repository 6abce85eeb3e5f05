use std::sync::Arc;

use sitewatch_core::{Config, ServerSettings};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cache::StatusCache;
use crate::error::EngineError;
use crate::orchestrator::{CycleReport, Orchestrator};
use crate::scraper::{ScrapeContext, ScraperRegistry};
use crate::shutdown::StopSignal;
use crate::sites::{run_site_loop, sync_site, SiteRegistry};

/// Read side of a running engine, shared with the HTTP surface.
#[derive(Clone)]
pub struct EngineHandle {
    cache: StatusCache,
    sites: Arc<SiteRegistry>,
    settings: Arc<ServerSettings>,
    origin: String,
}

impl EngineHandle {
    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    pub fn sites(&self) -> &SiteRegistry {
        &self.sites
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Name stamped as origin on statuses this instance produces.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// Owns the scrape orchestrator and one sync loop per enabled site.
pub struct StatusEngine {
    registry: Arc<ScraperRegistry>,
    orchestrator: Arc<Orchestrator>,
    handle: EngineHandle,
    ctx: ScrapeContext,
    stop: StopSignal,
    workers: Vec<JoinHandle<()>>,
}

impl StatusEngine {
    /// Validates `config` and wires the engine without starting anything.
    /// Invalid settings are fatal; invalid sources are skipped.
    pub fn from_config(config: &Config, registry: ScraperRegistry) -> Result<Self, EngineError> {
        config.server_settings.validate()?;

        let settings = Arc::new(config.server_settings.clone());
        let origin = settings.instance_name()?;
        let ctx = ScrapeContext::new(settings.clone(), origin.clone());

        let sources: Vec<_> = registry
            .validate_all(&config.sources)
            .into_iter()
            .map(Arc::new)
            .collect();

        let registry = Arc::new(registry);
        let cache = StatusCache::new(&origin, config.locations.clone());
        let sites = Arc::new(SiteRegistry::from_sources(&sources, &ctx));
        let orchestrator = Arc::new(Orchestrator::new(
            registry.clone(),
            cache.clone(),
            sources,
            ctx.clone(),
        ));

        info!(
            origin = %origin,
            sources = orchestrator.source_names().len(),
            sites = sites.len(),
            locations = config.locations.len(),
            "status engine configured"
        );

        Ok(Self {
            registry,
            orchestrator,
            handle: EngineHandle {
                cache,
                sites,
                settings,
                origin,
            },
            ctx,
            stop: StopSignal::new(),
            workers: Vec::new(),
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Spawns the orchestrator and the loops of enabled sites.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.stop.is_stopped() {
            return Err(EngineError::ShuttingDown);
        }
        if !self.workers.is_empty() {
            return Ok(());
        }

        let orchestrator = self.orchestrator.clone();
        let stop = self.stop.clone();
        self.workers
            .push(tokio::spawn(async move { orchestrator.run(stop).await }));

        for site in self.handle.sites.sites().filter(|site| site.enabled) {
            self.workers.push(tokio::spawn(run_site_loop(
                site.clone(),
                self.registry.clone(),
                self.handle.cache.clone(),
                self.ctx.clone(),
                self.stop.clone(),
            )));
        }
        Ok(())
    }

    /// One scrape cycle outside the schedule.
    pub async fn scrape_now(&self) -> CycleReport {
        self.orchestrator.run_once().await
    }

    /// One sync of `name` outside its schedule.
    pub async fn sync_now(&self, name: &str) -> Result<usize, EngineError> {
        let site = self
            .handle
            .sites
            .get(name)
            .ok_or_else(|| EngineError::SiteNotFound(name.to_string()))?;
        if !site.enabled {
            return Err(EngineError::SiteDisabled(name.to_string()));
        }
        sync_site(&site, &self.registry, &self.handle.cache, &self.ctx).await
    }

    /// Stops every loop and waits for them. In-flight requests finish within
    /// their timeouts.
    pub async fn shutdown(self) {
        self.stop.stop();
        for handle in self.workers {
            if let Err(err) = handle.await {
                error!("engine task crashed: {:?}", err);
            }
        }
        info!("status engine stopped");
    }
}
