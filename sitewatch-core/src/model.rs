//! Status model shared by the scrapers, the cache, the federation protocol
//! and the authorization engine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Label key to label value. Ordered so serialized output is stable.
pub type Labels = BTreeMap<String, String>;

/// A named point on the map that applications are placed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidLocation {
                name: self.name.clone(),
                reason: "name must not be empty".into(),
            });
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ConfigError::InvalidLocation {
                name: self.name.clone(),
                reason: format!("latitude {} outside [-90, 90]", self.latitude),
            });
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ConfigError::InvalidLocation {
                name: self.name.clone(),
                reason: format!("longitude {} outside [-180, 180]", self.longitude),
            });
        }
        Ok(())
    }
}

/// Up/down state of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
}

impl Status {
    pub fn is_up(self) -> bool {
        matches!(self, Status::Up)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Up => "up",
            Status::Down => "down",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Status::Up),
            "down" => Some(Status::Down),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known status of one application as produced by a source.
///
/// `(origin, source, name)` identifies the record everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStatus {
    pub name: String,
    pub location: String,
    pub status: Status,
    pub source: String,
    #[serde(rename = "originURL", alias = "origin")]
    pub origin: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl AppStatus {
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        status: Status,
        origin: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            status,
            source: source.into(),
            origin: origin.into(),
            labels: Labels::new(),
            error: None,
            latency_ms: None,
        }
    }

    pub fn up(
        name: impl Into<String>,
        location: impl Into<String>,
        origin: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self::new(name, location, Status::Up, origin, source)
    }

    /// Builds a down record carrying the reason it is down.
    pub fn down(
        name: impl Into<String>,
        location: impl Into<String>,
        origin: impl Into<String>,
        source: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut status = Self::new(name, location, Status::Down, origin, source);
        status.error = Some(error.into());
        status
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn is_up(&self) -> bool {
        self.status.is_up()
    }

    pub fn key(&self) -> AppKey {
        AppKey::new(&self.origin, &self.source, &self.name)
    }
}

/// Identity of an [`AppStatus`]: the producing instance, the source and the
/// application name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppKey {
    pub origin: String,
    pub source: String,
    pub name: String,
}

impl AppKey {
    pub fn new(origin: &str, source: &str, name: &str) -> Self {
        Self {
            origin: origin.to_string(),
            source: source.to_string(),
            name: name.to_string(),
        }
    }

    pub fn belongs_to(&self, origin: &str, source: Option<&str>) -> bool {
        self.origin == origin && source.map_or(true, |source| self.source == source)
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.origin, self.source, self.name)
    }
}

/// Source labels first, app labels override on key collision.
pub fn merge_labels(source: &Labels, app: &Labels) -> Labels {
    let mut merged = source.clone();
    for (key, value) in app {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
