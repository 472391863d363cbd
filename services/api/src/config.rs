//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where documents are kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process memory; everything is lost on restart.
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub log_level: Level,
    pub store_timeout: Duration,
    pub auth_session_days: i64,
    pub repair_on_load: bool,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key -> value source.
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and storage ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let store_backend = match var("STORE_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORE_BACKEND".to_string(),
                    format!("'{}' is not one of postgres, memory", other),
                ))
            }
        };

        let database_url = var("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Behaviour ---
        let store_timeout_ms = parse_number(&var, "STORE_TIMEOUT_MS", 5000)?;
        let auth_session_days = parse_number(&var, "AUTH_SESSION_DAYS", 30)?;
        if auth_session_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "AUTH_SESSION_DAYS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let repair_on_load = match var("REPAIR_ON_LOAD").as_deref() {
            None | Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "REPAIR_ON_LOAD".to_string(),
                    format!("'{}' is not a boolean", other),
                ))
            }
        };

        let cors_origin =
            var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            store_backend,
            database_url,
            log_level,
            store_timeout: Duration::from_millis(store_timeout_ms as u64),
            auth_session_days,
            repair_on_load,
            cors_origin,
        })
    }
}

fn parse_number<F>(var: &F, key: &str, default: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(key.to_string(), format!("'{}' is not a number", raw))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_for_memory_backend() {
        let config = load(&[("STORE_BACKEND", "memory")]).unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.store_timeout, Duration::from_millis(5000));
        assert_eq!(config.auth_session_days, 30);
        assert!(config.repair_on_load);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn postgres_requires_database_url() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(var)) if var == "DATABASE_URL"));
        let config = load(&[("DATABASE_URL", "postgres://localhost/care")]).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Postgres);
    }

    #[test]
    fn invalid_values_are_reported() {
        assert!(matches!(
            load(&[("STORE_BACKEND", "memory"), ("STORE_TIMEOUT_MS", "soon")]),
            Err(ConfigError::InvalidValue(var, _)) if var == "STORE_TIMEOUT_MS"
        ));
        assert!(matches!(
            load(&[("STORE_BACKEND", "redis")]),
            Err(ConfigError::InvalidValue(var, _)) if var == "STORE_BACKEND"
        ));
        assert!(matches!(
            load(&[("STORE_BACKEND", "memory"), ("REPAIR_ON_LOAD", "maybe")]),
            Err(ConfigError::InvalidValue(var, _)) if var == "REPAIR_ON_LOAD"
        ));
    }
}
