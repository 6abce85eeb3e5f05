//! SiteWatch engine: source scrapers, the scrape orchestrator, the status
//! cache and the federation sync loops.

pub mod cache;
pub mod error;
pub mod orchestrator;
pub mod runtime;
pub mod scraper;
pub mod shutdown;
pub mod sites;
pub mod source;

pub use cache::{CacheEntry, StatusCache};
pub use error::{EngineError, ScrapeError};
pub use orchestrator::{CycleReport, Orchestrator};
pub use runtime::{EngineHandle, StatusEngine};
pub use scraper::{ScrapeContext, ScrapeOutput, Scraper, ScraperRegistry};
pub use shutdown::StopSignal;
pub use sites::{SiteRegistry, SiteReport};
pub use source::{DeclaredApp, Source, SourceConfig};
