//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG_PATH";

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Longest accepted rate limit window (one year)
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub health_check: HealthCheckConfig,
    pub proxy: ProxyConfig,
    pub logging: LoggingConfig,
    pub backends: Vec<BackendConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// How the client identity used for rate limiting is resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientIdentitySource {
    /// Socket peer address
    #[default]
    PeerAddr,
    /// First hop of `X-Forwarded-For`, falling back to the peer address
    ForwardedFor,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_secs: u64,
    pub client_identity: ClientIdentitySource,
    /// How often expired client windows are dropped
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 5,
            window_secs: 60,
            client_identity: ClientIdentitySource::default(),
            sweep_interval_secs: 300,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Health probing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub interval_secs: u64,
    pub timeout_ms: u64,
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            timeout_ms: 5000,
            path: "/health".to_string(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Request forwarding configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub timeout_ms: u64,
    /// Path prefix routed to the backends; stripped before forwarding
    pub route_prefix: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            route_prefix: "/api".to_string(),
        }
    }
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Backend service configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendConfig {
    pub id: String,
    pub url: String,
}

impl BackendConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file and environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let defaults = Settings::default();

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("rate_limit.max_requests", i64::from(defaults.rate_limit.max_requests))?
            .set_default("rate_limit.window_secs", defaults.rate_limit.window_secs as i64)?
            .set_default("health_check.interval_secs", defaults.health_check.interval_secs as i64)?
            .set_default("proxy.timeout_ms", defaults.proxy.timeout_ms as i64)?
            // Load from configuration file
            .add_source(File::from(path.as_ref()).required(false))
            // Override with environment variables (GATEWAY__RATE_LIMIT__MAX_REQUESTS=10)
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        if self.rate_limit.max_requests == 0 {
            return Err(invalid("rate_limit.max_requests must be at least 1"));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(invalid("rate_limit.window_secs must be at least 1"));
        }
        if self.rate_limit.window_secs > MAX_WINDOW_SECS {
            return Err(invalid(format!(
                "rate_limit.window_secs must be at most {}",
                MAX_WINDOW_SECS
            )));
        }
        if self.rate_limit.sweep_interval_secs == 0 {
            return Err(invalid("rate_limit.sweep_interval_secs must be at least 1"));
        }

        if self.health_check.interval_secs == 0 {
            return Err(invalid("health_check.interval_secs must be at least 1"));
        }
        if self.health_check.timeout_ms == 0 {
            return Err(invalid("health_check.timeout_ms must be at least 1"));
        }
        if !self.health_check.path.starts_with('/') {
            return Err(invalid("health_check.path must start with '/'"));
        }

        if self.proxy.timeout_ms == 0 {
            return Err(invalid("proxy.timeout_ms must be at least 1"));
        }
        let prefix = &self.proxy.route_prefix;
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return Err(invalid(format!(
                "proxy.route_prefix '{}' must start with '/' and not end with one",
                prefix
            )));
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.id.is_empty() {
                return Err(invalid("Backend id cannot be empty"));
            }
            if backend.url.is_empty() {
                return Err(invalid(format!("Backend '{}' must have a url", backend.id)));
            }
            if !seen.insert(backend.id.as_str()) {
                return Err(AppError::DuplicateEndpoint(backend.id.clone()));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Config(config::ConfigError::Message(message.into()))
}
