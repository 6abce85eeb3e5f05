use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use sitewatch_core::config::Environment;
use sitewatch_core::logging::LogFormat;
use sitewatch_core::ConfigError;

/// Process settings read from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_address: String,
    pub config_path: PathBuf,
    pub log_level: Option<String>,
    pub log_format: LogFormat,
    pub environment: Environment,
    pub security: SecurityConfig,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_address = read_string("SITEWATCH_BIND").unwrap_or_else(|| "0.0.0.0:8080".into());
        let config_path = read_string("SITEWATCH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("sitewatch.yaml"));
        let log_level = read_string("SITEWATCH_LOG");
        let log_format = read_string("SITEWATCH_LOG_FORMAT")
            .map(|raw| LogFormat::parse(&raw))
            .unwrap_or_default();
        let environment = read_string("SITEWATCH_ENV")
            .map(|raw| Environment::parse(&raw))
            .unwrap_or_default();

        Ok(Self {
            bind_address,
            config_path,
            log_level,
            log_format,
            environment,
            security: SecurityConfig::from_env()?,
        })
    }

    /// Settings for in-process servers: ephemeral port, no service token.
    pub fn for_tests() -> Self {
        Self {
            bind_address: "127.0.0.1:0".into(),
            config_path: PathBuf::from("sitewatch.yaml"),
            log_level: None,
            log_format: LogFormat::default(),
            environment: Environment::Development,
            security: SecurityConfig::default(),
        }
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Required in `X-Service-Token` on `/api` requests when set.
    pub service_token: Option<String>,
    pub cors_allowed_origins: Vec<String>,
    pub max_concurrent_requests: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            service_token: None,
            cors_allowed_origins: vec!["*".to_string()],
            max_concurrent_requests: 128,
        }
    }
}

impl SecurityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let service_token = read_string("SITEWATCH_SERVICE_TOKEN");

        let cors_allowed_origins = read_string("SITEWATCH_ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        let max_concurrent_requests = parse_env::<usize>("SITEWATCH_MAX_CONCURRENCY", 128)?.max(1);

        Ok(Self {
            service_token,
            cors_allowed_origins,
            max_concurrent_requests,
        })
    }
}

fn read_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(default)
            } else {
                T::from_str(trimmed)
                    .map_err(|err| ConfigError::Internal(format!("invalid value for {key}: {err}")))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(ConfigError::InvalidEnvVar { key, source: err }),
    }
}
