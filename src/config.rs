//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::handlers::MovementWriteMode;

/// Ledger configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// How long to wait for a pooled connection
    pub database_acquire_timeout: Duration,

    /// Redis URL for the balance cache. Without it an in-process cache is used.
    pub redis_url: Option<String>,

    /// Time-to-live of cached balances
    pub balance_cache_ttl: Duration,

    /// How single movements are committed
    pub movement_write_mode: MovementWriteMode,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections =
            parse_or("DATABASE_MAX_CONNECTIONS", lookup("DATABASE_MAX_CONNECTIONS"), 10u32)?;
        if database_max_connections == 0 {
            return Err(ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"));
        }

        let database_acquire_timeout = Duration::from_secs(parse_or(
            "DATABASE_ACQUIRE_TIMEOUT_SECS",
            lookup("DATABASE_ACQUIRE_TIMEOUT_SECS"),
            5u64,
        )?);

        let redis_url = lookup("REDIS_URL").filter(|url| !url.trim().is_empty());

        let balance_cache_ttl = Duration::from_secs(parse_or(
            "BALANCE_CACHE_TTL_SECS",
            lookup("BALANCE_CACHE_TTL_SECS"),
            60u64,
        )?);

        let movement_write_mode = parse_or(
            "MOVEMENT_WRITE_MODE",
            lookup("MOVEMENT_WRITE_MODE"),
            MovementWriteMode::Atomic,
        )?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            database_acquire_timeout,
            redis_url,
            balance_cache_ttl,
            movement_write_mode,
            environment,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Parse an optional raw value, falling back to `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name)),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
