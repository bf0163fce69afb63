//! Centralized daemon configuration.
//!
//! This module provides strongly-typed configuration for the daemon,
//! loaded via the `config` crate from environment variables. Nested
//! sections use a double underscore, e.g. `SCHEDULER__TICK_SECONDS=30`.

use boltflow_channel::{DEFAULT_VERIFICATION_URL, NodeSettings};
use serde::Deserialize;
use std::time::Duration;

/// Daemon configuration composed from the service configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Upper bound on pooled database connections.
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,

    /// Time-trigger scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Channel reconciliation configuration.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// The monitored Lightning node.
    #[serde(default)]
    pub node: NodeSettings,
}

fn default_database_max_connections() -> u32 {
    5
}

/// Time-trigger scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between trigger discovery passes, in seconds.
    #[serde(default = "default_scheduler_tick_seconds")]
    pub tick_seconds: u64,

    /// Lightning node recorded on dispatch log entries.
    #[serde(default)]
    pub lightning_node_id: i64,
}

fn default_scheduler_tick_seconds() -> u64 {
    10
}

impl SchedulerConfig {
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_scheduler_tick_seconds(),
            lightning_node_id: 0,
        }
    }
}

/// Channel reconciliation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// Interval between reconciliation sweeps, in seconds.
    #[serde(default = "default_maintenance_tick_seconds")]
    pub tick_seconds: u64,

    /// Pause after every verification service call, in milliseconds.
    #[serde(default = "default_verification_delay_ms")]
    pub verification_delay_ms: u64,

    /// Base URL of the verification service.
    #[serde(default = "default_verification_url")]
    pub verification_url: String,
}

fn default_maintenance_tick_seconds() -> u64 {
    3600
}

fn default_verification_delay_ms() -> u64 {
    500
}

fn default_verification_url() -> String {
    DEFAULT_VERIFICATION_URL.to_string()
}

impl MaintenanceConfig {
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds.max(1))
    }

    #[must_use]
    pub fn verification_delay(&self) -> Duration {
        Duration::from_millis(self.verification_delay_ms)
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_maintenance_tick_seconds(),
            verification_delay_ms: default_verification_delay_ms(),
            verification_url: default_verification_url(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boltflow_channel::{Chain, Network};

    fn environment(vars: &[(&str, &str)]) -> config::Environment {
        let mut source = config::Map::new();
        for (key, value) in vars {
            source.insert((*key).to_string(), (*value).to_string());
        }
        config::Environment::default().source(Some(source))
    }

    #[test]
    fn service_configs_have_correct_defaults() {
        let scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.tick(), Duration::from_secs(10));

        let maintenance = MaintenanceConfig::default();
        assert_eq!(maintenance.tick(), Duration::from_secs(3600));
        assert_eq!(maintenance.verification_delay(), Duration::from_millis(500));
        assert_eq!(maintenance.verification_url, "https://vector.ln.capital/");
    }

    #[test]
    fn loads_nested_sections() {
        let config = ServerConfig::from_environment(environment(&[
            ("DATABASE_URL", "postgres://localhost/boltflow"),
            ("SCHEDULER__TICK_SECONDS", "30"),
            ("NODE__NETWORK", "testnet"),
        ]))
        .expect("config");

        assert_eq!(config.database_url, "postgres://localhost/boltflow");
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.scheduler.tick_seconds, 30);
        assert_eq!(config.maintenance.tick_seconds, 3600);
        assert_eq!(config.node.chain, Chain::Bitcoin);
        assert_eq!(config.node.network, Network::Testnet);
    }

    #[test]
    fn database_url_is_required() {
        assert!(ServerConfig::from_environment(environment(&[])).is_err());
    }

    #[test]
    fn zero_tick_is_raised_to_one_second() {
        let scheduler = SchedulerConfig {
            tick_seconds: 0,
            lightning_node_id: 1,
        };
        assert_eq!(scheduler.tick(), Duration::from_secs(1));
    }
}
