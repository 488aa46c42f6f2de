//! Configuration management for Ratekeeper.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{RatekeeperError, Result};
use crate::identity::{IdentityResolver, DEFAULT_FORWARDED_FOR_HEADER, DEFAULT_REAL_IP_HEADER};
use crate::ratelimit::LimiterConfig;

/// Prefix for environment variable overrides, e.g.
/// `RATEKEEPER__RATE_LIMITING__INTERVAL_MS=250`.
const ENV_PREFIX: &str = "RATEKEEPER";

/// Main configuration for the Ratekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Client identity configuration
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Minimum interval between admitted requests per client, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Requests a client may make back to back
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Sweep period in milliseconds (defaults to five intervals)
    #[serde(default)]
    pub sweep_interval_ms: Option<u64>,

    /// Idle time before a client is forgotten, in milliseconds (defaults to ten intervals)
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            burst: default_burst(),
            sweep_interval_ms: None,
            idle_timeout_ms: None,
        }
    }
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_burst() -> u32 {
    1
}

impl RateLimitingConfig {
    /// Convert to the limiter's runtime configuration.
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            interval: Duration::from_millis(self.interval_ms),
            burst: self.burst,
            sweep_interval: self.sweep_interval_ms.map(Duration::from_millis),
            idle_timeout: self.idle_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Trusted headers for client identity resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Single-value header holding the client address
    #[serde(default = "default_real_ip_header")]
    pub real_ip_header: String,

    /// Comma-separated forwarding chain header
    #[serde(default = "default_forwarded_for_header")]
    pub forwarded_for_header: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            real_ip_header: default_real_ip_header(),
            forwarded_for_header: default_forwarded_for_header(),
        }
    }
}

fn default_real_ip_header() -> String {
    DEFAULT_REAL_IP_HEADER.to_string()
}

fn default_forwarded_for_header() -> String {
    DEFAULT_FORWARDED_FOR_HEADER.to_string()
}

impl IdentityConfig {
    /// Build a resolver trusting the configured headers.
    pub fn resolver(&self) -> Result<IdentityResolver> {
        IdentityResolver::new(&self.real_ip_header, &self.forwarded_for_header)
            .map_err(|e| RatekeeperError::Config(e.to_string()))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl RatekeeperConfig {
    /// Load configuration from an optional file, overridden by
    /// `RATEKEEPER__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: RatekeeperConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RatekeeperConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RatekeeperError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every section can be turned into its runtime form.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.limiter_config().validate()?;
        self.identity.resolver()?;
        Ok(())
    }
}
