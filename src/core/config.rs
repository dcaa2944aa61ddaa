use anyhow::{Context, Result};

use crate::core::app_error::AppError;

pub struct Config {
    pub port: u16,
    pub database: DatabaseConfig,
}

pub struct DatabaseConfig {
    pub url: String,
}

/// Loads the startup configuration from the environment.
pub fn load() -> Result<Config> {
    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .context("PORT must be a valid port number")?;

    let url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

    Ok(Config {
        port,
        database: DatabaseConfig { url },
    })
}

/// Request-time lookup for integration credentials. Absence surfaces as a
/// descriptive configuration error instead of a panic.
pub fn require(key: &str) -> Result<String, AppError> {
    std::env::var(key).map_err(|_| AppError::Config(format!("{key} is not set")))
}

/// Request-time lookup with a fallback value.
pub fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
