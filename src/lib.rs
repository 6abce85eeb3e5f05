//! SiteWatch: up/down status of applications spread across locations,
//! aggregated from Prometheus queries, HTTP checks and peer instances.
//!
//! The workspace is split into:
//!
//! * [`core`]: status model, configuration document, errors and logging
//! * [`protocol`]: federation wire format and request signing
//! * [`engine`]: scrapers, scrape orchestrator, status cache, site sync loops
//! * [`access`]: role based label filtering of the cached statuses
//! * [`gateway`]: HTTP surface and the `sitewatch` binary

pub use sitewatch_access as access;
pub use sitewatch_core as core;
pub use sitewatch_engine as engine;
pub use sitewatch_gateway as gateway;
pub use sitewatch_protocol as protocol;

pub use sitewatch_core::{AppKey, AppStatus, Config, Location, Status};
pub use sitewatch_engine::{EngineHandle, ScraperRegistry, StatusCache, StatusEngine};
