//! Forwarder configuration.
//!
//! The mapping file is TOML: top-level settings plus one `[[forward]]` table
//! per listening port. Environment variables override the file for the
//! settings that differ between deployments of the same mapping.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::forward::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};

/// Default upstream SOCKS5 proxy address.
pub const DEFAULT_PROXY_ADDR: &str = "localhost:1055";

/// Default port for the health endpoints.
pub const DEFAULT_HEALTH_PORT: u16 = 8000;

/// One listening port bound to one destination.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PortMapping {
    /// Local port to listen on (bound on 0.0.0.0).
    pub port: u16,
    /// Destination address (`host:port`) reached through the proxy.
    pub destination: String,
}

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Upstream SOCKS5 proxy address.
    #[serde(default = "default_proxy_addr")]
    pub proxy_addr: String,

    /// Port for the liveness/readiness endpoints.
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// Dial attempts per session before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay between dial attempts, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Keep-alive probe period for both legs, in seconds.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Port-to-destination mappings.
    #[serde(default, rename = "forward")]
    pub forwards: Vec<PortMapping>,
}

fn default_proxy_addr() -> String {
    DEFAULT_PROXY_ADDR.to_string()
}

fn default_health_port() -> u16 {
    DEFAULT_HEALTH_PORT
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY.as_millis() as u64
}

fn default_keepalive_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load the mapping file, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("error opening config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("error parsing config file {}", path.display()))?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw).context("malformed configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("FWD_PROXY_ADDR") {
            self.proxy_addr = addr;
        }
        if let Ok(level) = std::env::var("FWD_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(port) = std::env::var("FWD_HEALTH_PORT") {
            self.health_port = port
                .parse()
                .context("FWD_HEALTH_PORT must be a port number")?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for mapping in &self.forwards {
            if !seen.insert(mapping.port) {
                bail!("duplicate forward entry for port {}", mapping.port);
            }
            if mapping.destination.is_empty() {
                bail!("empty destination for port {}", mapping.port);
            }
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        Ok(())
    }

    /// Retry schedule derived from the configured budget and base delay.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }

    /// Keep-alive probe period for both legs.
    pub fn keepalive_period(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(
            r#"
            proxy_addr = "proxy.internal:1080"
            health_port = 9000
            max_attempts = 5
            base_delay_ms = 250

            [[forward]]
            port = 5432
            destination = "db.internal:5432"

            [[forward]]
            port = 6379
            destination = "cache.internal:6379"
            "#,
        )
        .unwrap();

        assert_eq!(config.proxy_addr, "proxy.internal:1080");
        assert_eq!(config.health_port, 9000);
        assert_eq!(config.forwards.len(), 2);
        assert_eq!(config.forwards[0].port, 5432);
        assert_eq!(config.forwards[1].destination, "cache.internal:6379");
        assert_eq!(
            config.retry_policy(),
            RetryPolicy::new(5, Duration::from_millis(250))
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str(
            r#"
            [[forward]]
            port = 8080
            destination = "svc:80"
            "#,
        )
        .unwrap();

        assert_eq!(config.proxy_addr, DEFAULT_PROXY_ADDR);
        assert_eq!(config.health_port, DEFAULT_HEALTH_PORT);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.keepalive_period(), Duration::from_secs(30));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_duplicate_port_rejected() {
        let err = Config::from_toml_str(
            r#"
            [[forward]]
            port = 8080
            destination = "a:1"

            [[forward]]
            port = 8080
            destination = "b:2"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate forward entry"));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(Config::from_toml_str("port_mappings = [oops").is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = Config::from_toml_str("max_attempts = 0").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }
}
