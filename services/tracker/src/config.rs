//! services/tracker/src/config.rs
//!
//! Defines the service's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use timecharge_core::EngineConfig;
use tracing::Level;
use uuid::Uuid;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub log_level: Level,
    pub max_connections: u32,
    pub event_capacity: usize,
    /// Restricts a rebuild to one user's timesheets.
    pub rebuild_user_id: Option<Uuid>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to keep tests hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let max_connections = parse_or("DB_MAX_CONNECTIONS", &lookup, 5u32)?;
        let event_capacity = parse_or(
            "EVENT_CAPACITY",
            &lookup,
            EngineConfig::default().event_capacity,
        )?;

        let rebuild_user_id = lookup("REBUILD_USER_ID")
            .map(|raw| {
                raw.parse::<Uuid>().map_err(|e| {
                    ConfigError::InvalidValue("REBUILD_USER_ID".to_string(), e.to_string())
                })
            })
            .transpose()?;

        Ok(Self {
            database_url,
            log_level,
            max_connections,
            event_capacity,
            rebuild_user_id,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            event_capacity: self.event_capacity,
            ..EngineConfig::default()
        }
    }
}

fn parse_or<T, F>(name: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}
