//! Core shared library for SiteWatch.
//!
//! This crate exposes the primitives every other crate depends on: the
//! status model (locations, applications, labels), the canonical error
//! type, the configuration document and process settings, and logging setup.

pub mod config;
pub mod errors;
pub mod logging;
pub mod model;
pub mod serde_utils;

pub use config::{Config, RawSource, ServerSettings};
pub use errors::{ConfigError, CoreError, Result as CoreResult};
pub use model::{AppKey, AppStatus, Labels, Location, Status};
