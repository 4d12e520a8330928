//! Application configuration
//!
//! Sources, lowest priority first: built-in defaults, `config/default`,
//! `config/{RUN_MODE}`, then `TANK__`-prefixed environment variables
//! (`TANK__DATABASE__URL`, `TANK__POOL__DEFAULT_TTL_SECS`, ...).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use tracing::debug;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Apply pending schema migrations at startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

/// Number pool configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    /// Lease duration used when a tank has no default TTL of its own
    #[serde(default = "default_ttl")]
    pub default_ttl_secs: i64,

    /// How many candidate numbers a tank assignment tries before giving up
    #[serde(default = "default_max_lease_attempts")]
    pub max_lease_attempts: usize,
}

fn default_ttl() -> i64 {
    3600
}

fn default_max_lease_attempts() -> usize {
    16
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl(),
            max_lease_attempts: default_max_lease_attempts(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        debug!("Loading configuration for run mode {}", run_mode);

        let config = Config::builder()
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.acquire_timeout_secs", 30)?
            .set_default("database.idle_timeout_secs", 600)?
            .set_default("database.run_migrations", true)?
            .set_default("pool.default_ttl_secs", 3600)?
            .set_default("pool.max_lease_attempts", 16)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Environment variables with TANK_ prefix, e.g. TANK__DATABASE__URL
            .add_source(
                Environment::with_prefix("TANK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut loaded: AppConfig = config.try_deserialize()?;

        // Plain DATABASE_URL (e.g. from .env) wins when no explicit url is set
        if loaded.database.url.is_empty() {
            if let Ok(url) = env::var("DATABASE_URL") {
                loaded.database.url = url;
            }
        }

        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.default_ttl_secs, 3600);
        assert_eq!(config.max_lease_attempts, 16);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config = Config::builder()
            .set_override("database.url", "postgresql://localhost/tanks")
            .unwrap()
            .build()
            .unwrap();

        let app: AppConfig = config.try_deserialize().unwrap();
        assert_eq!(app.database.url, "postgresql://localhost/tanks");
        assert_eq!(app.database.max_connections, 10);
        assert!(app.database.run_migrations);
        assert_eq!(app.pool.default_ttl_secs, 3600);
    }
}
