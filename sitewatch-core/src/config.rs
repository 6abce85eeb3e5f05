use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ConfigError;
use crate::model::{Labels, Location};
use crate::serde_utils;

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// A source as written in the configuration document. The `config` payload is
/// decoded by the scraper registered for `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Instance-wide settings shared by the scrapers and the sync responder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Identity stamped as origin on locally produced statuses.
    #[serde(default)]
    pub name: Option<String>,
    /// Shared secret peers must sign `/sync` requests with.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub sync_enable: bool,
    #[serde(default = "default_scrape_interval", with = "serde_utils::duration")]
    pub scrape_interval: Duration,
    #[serde(default = "default_scrape_timeout", with = "serde_utils::duration")]
    pub scrape_timeout: Duration,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Role name to the label grants it carries.
    #[serde(default)]
    pub roles: BTreeMap<String, Labels>,
}

fn default_scrape_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_scrape_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_parallel() -> usize {
    10
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: None,
            token: None,
            sync_enable: false,
            scrape_interval: default_scrape_interval(),
            scrape_timeout: default_scrape_timeout(),
            max_parallel: default_max_parallel(),
            roles: BTreeMap::new(),
        }
    }
}

impl ServerSettings {
    /// Name of this instance: the configured name, else the machine's host
    /// name. Fails when neither yields a usable value, so unnamed instances
    /// never share a placeholder identity.
    pub fn instance_name(&self) -> Result<String, ConfigError> {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
            return Ok(name.to_string());
        }
        let host = gethostname::gethostname();
        let host = host.to_string_lossy();
        let host = host.trim();
        if host.is_empty() || host == "localhost" {
            return Err(ConfigError::InvalidServerSettings(
                "server_settings.name is unset and the host name cannot identify this instance"
                    .into(),
            ));
        }
        Ok(host.to_string())
    }

    /// Configured sync token, ignoring blank values.
    pub fn sync_token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel == 0 {
            return Err(ConfigError::InvalidServerSettings(
                "max_parallel must be at least 1".into(),
            ));
        }
        if self.scrape_interval.is_zero() {
            return Err(ConfigError::InvalidServerSettings(
                "scrape_interval must be positive".into(),
            ));
        }
        if self.scrape_timeout.is_zero() {
            return Err(ConfigError::InvalidServerSettings(
                "scrape_timeout must be positive".into(),
            ));
        }
        for (role, grants) in &self.roles {
            if role.trim().is_empty() {
                return Err(ConfigError::InvalidServerSettings(
                    "role names must not be empty".into(),
                ));
            }
            if grants.keys().any(|key| key.trim().is_empty()) {
                return Err(ConfigError::InvalidServerSettings(format!(
                    "role {role} grants an empty label key"
                )));
            }
        }
        if self.sync_enable && self.sync_token().is_none() {
            warn!("sync responder enabled without a token; /sync accepts unsigned requests");
        }
        Ok(())
    }
}

/// The configuration document: locations, sources and server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub sources: Vec<RawSource>,
    #[serde(default)]
    pub server_settings: ServerSettings,
}

impl Config {
    /// Loads and validates a YAML or JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config = if is_json {
            Self::from_json_str(&raw)
        } else {
            Self::from_yaml_str(&raw)
        }
        .map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, String> {
        serde_yaml::from_str(raw).map_err(|err| err.to_string())
    }

    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|err| err.to_string())
    }

    /// Document-level checks. Per-source payloads are validated by the
    /// scraper registry, which skips broken sources instead of failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server_settings.validate()?;

        let mut seen = HashSet::new();
        for location in &self.locations {
            location.validate()?;
            if !seen.insert(location.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "location",
                    name: location.name.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "source",
                    name: source.name.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
locations:
  - name: paris
    latitude: 48.85
    longitude: 2.35
sources:
  - name: prom
    type: prometheus
    labels:
      env: prod
    config:
      url: http://prometheus:9090
      apps: []
server_settings:
  name: node-a
  token: secret
  sync_enable: true
  scrape_interval: 1m
  roles:
    ops:
      env: prod
"#;

    #[test]
    fn parses_yaml_document() {
        let config = Config::from_yaml_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.locations.len(), 1);
        assert_eq!(config.sources[0].kind, "prometheus");
        assert_eq!(config.sources[0].labels["env"], "prod");
        assert_eq!(config.server_settings.scrape_interval, Duration::from_secs(60));
        assert_eq!(config.server_settings.scrape_timeout, Duration::from_secs(10));
        assert_eq!(config.server_settings.instance_name().unwrap(), "node-a");
        assert_eq!(config.server_settings.roles["ops"]["env"], "prod");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server_settings.sync_token(), Some("secret"));
    }

    #[test]
    fn rejects_duplicate_locations() {
        let mut config = Config::from_yaml_str(SAMPLE).unwrap();
        config.locations.push(config.locations[0].clone());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Duplicate { kind: "location", .. })
        ));
    }

    #[test]
    fn rejects_zero_parallelism() {
        let settings = ServerSettings {
            max_parallel: 0,
            ..ServerSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_unknown_server_setting() {
        let raw = "server_settings:\n  unknown_flag: true\n";
        assert!(Config::from_yaml_str(raw).is_err());
    }

    #[test]
    fn unnamed_instance_uses_machine_host_name() {
        let settings = ServerSettings {
            name: Some("  ".into()),
            ..ServerSettings::default()
        };
        let host = gethostname::gethostname().to_string_lossy().trim().to_string();
        match settings.instance_name() {
            Ok(name) => {
                assert_eq!(name, host);
                assert_ne!(name, "localhost");
            }
            Err(err) => {
                assert!(host.is_empty() || host == "localhost", "{err}");
            }
        }
    }

    #[test]
    fn blank_token_counts_as_unset() {
        let settings = ServerSettings {
            token: Some("   ".into()),
            ..ServerSettings::default()
        };
        assert_eq!(settings.sync_token(), None);
    }
}
