//! Application configuration
//!
//! Centralized configuration management using the `config` crate.
//! Values are loaded from defaults, optional config files, and
//! `TANDEM`-prefixed environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub agi: AgiConfig,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub balancer: BalancerConfig,
}

/// Operator HTTP API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Call-control (AGI) gateway configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AgiConfig {
    /// Gateway bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Gateway port the dialplan connects to
    #[serde(default = "default_agi_port")]
    pub port: u16,
}

fn default_agi_port() -> u16 {
    8002
}

/// Database configuration
///
/// When `url` is empty the mediator runs on in-memory state only.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; empty = standalone in-memory mode
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Routing engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// How often the stale-call sweep runs, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Age after which a live call is considered abandoned, in seconds
    #[serde(default = "default_stale_call_age")]
    pub stale_call_secs: u64,

    /// Release the assigned DID immediately when a leg-3/leg-5
    /// verification fails, instead of waiting for the sweep
    #[serde(default)]
    pub release_did_on_failed_verification: bool,

    /// Treat an ANI mismatch on the returning leg as fatal instead of a
    /// warning (some intermediate carriers reformat the number)
    #[serde(default)]
    pub fail_on_ani_mismatch: bool,
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_stale_call_age() -> u64 {
    1800
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
            stale_call_secs: default_stale_call_age(),
            release_did_on_failed_verification: false,
            fail_on_ani_mismatch: false,
        }
    }
}

/// Load balancer health monitoring configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BalancerConfig {
    /// How often the health monitor scans peer stats, in seconds
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,

    /// Idle time after which an unhealthy peer is reset and re-marked
    /// healthy, in seconds
    #[serde(default = "default_recovery_cooldown")]
    pub recovery_cooldown_secs: u64,
}

fn default_health_interval() -> u64 {
    30
}

fn default_recovery_cooldown() -> u64 {
    300
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: default_health_interval(),
            recovery_cooldown_secs: default_recovery_cooldown(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, optional config files, and the
    /// environment
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("agi.host", "0.0.0.0")?
            .set_default("agi.port", 8002)?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("engine.cleanup_interval_secs", 300)?
            .set_default("engine.stale_call_secs", 1800)?
            .set_default("engine.release_did_on_failed_verification", false)?
            .set_default("engine.fail_on_ani_mismatch", false)?
            .set_default("balancer.health_check_interval_secs", 30)?
            .set_default("balancer.recovery_cooldown_secs", 300)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("TANDEM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the operator API bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get the AGI gateway bind address
    pub fn agi_addr(&self) -> String {
        format!("{}:{}", self.agi.host, self.agi.port)
    }

    /// Whether a backing database is configured
    pub fn has_database(&self) -> bool {
        !self.database.url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_config() {
        let config = EngineConfig::default();
        assert_eq!(config.cleanup_interval_secs, 300);
        assert_eq!(config.stale_call_secs, 1800);
        assert!(!config.release_did_on_failed_verification);
        assert!(!config.fail_on_ani_mismatch);
    }

    #[test]
    fn test_default_balancer_config() {
        let config = BalancerConfig::default();
        assert_eq!(config.health_check_interval_secs, 30);
        assert_eq!(config.recovery_cooldown_secs, 300);
    }
}
