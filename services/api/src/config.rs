//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::TimeDelta;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

use anki_sync_core::DEFAULT_MEDIA_SYNC_TIMEOUT;

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
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub credentials_path: PathBuf,
    /// Media-sync polls (one per second) before a sync cycle gives up.
    pub media_sync_timeout: u32,
    pub access_token_ttl: TimeDelta,
    pub refresh_token_ttl: TimeDelta,
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

        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:5000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Credential Vault ---
        let credentials_path = lookup("CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/.credentials"));

        // --- Sync and Token Lifetimes ---
        let media_sync_timeout = match lookup("MEDIA_SYNC_TIMEOUT_SECS") {
            Some(raw) => parse_number::<u32>("MEDIA_SYNC_TIMEOUT_SECS", &raw)?,
            None => DEFAULT_MEDIA_SYNC_TIMEOUT,
        };
        let access_token_ttl = seconds_var(&lookup, "ACCESS_TOKEN_TTL_SECS", 24 * 60 * 60)?;
        let refresh_token_ttl = seconds_var(&lookup, "REFRESH_TOKEN_TTL_SECS", 30 * 24 * 60 * 60)?;

        Ok(Self {
            bind_address,
            log_level,
            credentials_path,
            media_sync_timeout,
            access_token_ttl,
            refresh_token_ttl,
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

fn seconds_var<F>(lookup: &F, key: &str, default_secs: i64) -> Result<TimeDelta, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = match lookup(key) {
        Some(raw) => parse_number::<i64>(key, &raw)?,
        None => default_secs,
    };
    if secs <= 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be a positive number of seconds".to_string(),
        ));
    }
    TimeDelta::try_seconds(secs)
        .ok_or_else(|| ConfigError::InvalidValue(key.to_string(), "out of range".to_string()))
}
