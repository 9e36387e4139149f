//! Configuration for the adaptive-learning backend.

pub mod secret;

use std::env;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Application configuration loaded once at startup, then read-only.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// JWT secret used to verify bearer tokens (issuance stays out of scope).
    pub jwt_secret: String,
    /// Address to bind the HTTP server to.
    pub bind_address: String,
    /// Comma-separated list of allowed CORS origins. Empty means permissive.
    pub cors_origins: Vec<String>,
    /// `tracing_subscriber::EnvFilter` directive, e.g. "info,sqlx=warn".
    pub log_level: String,
    /// Symmetric key (AES-256-GCM) for encrypting secrets at rest, e.g.
    /// per-user external provider API keys.
    pub encryption_key: String,
    /// When true, the Budget Gate enforces admission strictly; when false,
    /// rejections are logged but calls proceed (useful in staging).
    pub strict_admission: bool,
    /// Number of long-lived generation workers (C6).
    pub worker_concurrency: u32,
    /// Default queue lease duration, seconds (C5).
    pub default_lease_seconds: i64,
    /// Default max retry attempts for a generation task (C5).
    pub default_retry_cap: i32,
    /// When true, `from_env` exits the process on a missing required var
    /// instead of returning `Err`.
    pub enforce_env_validation: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let enforce_env_validation = env_flag("ENFORCE_ENV_VALIDATION");

        let config = Self {
            database_url: required_var("DATABASE_URL", enforce_env_validation)?,
            jwt_secret: required_var("JWT_SECRET", enforce_env_validation)?,
            bind_address: env_var_or("BIND_ADDRESS", "0.0.0.0:8080"),
            cors_origins: env_var_or("CORS_ORIGINS", "")
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            log_level: env_var_or("LOG_LEVEL", "info,sqlx=warn"),
            encryption_key: required_var("ENCRYPTION_KEY", enforce_env_validation)?,
            strict_admission: env_flag("STRICT_ADMISSION"),
            worker_concurrency: env_var_or("WORKER_CONCURRENCY", "4")
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue(
                        "WORKER_CONCURRENCY".to_string(),
                        "must be a positive integer".to_string(),
                    )
                })?,
            default_lease_seconds: env_var_or("DEFAULT_LEASE_SECONDS", "300")
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue(
                        "DEFAULT_LEASE_SECONDS".to_string(),
                        "must be an integer".to_string(),
                    )
                })?,
            default_retry_cap: env_var_or("DEFAULT_RETRY_CAP", "3").parse().map_err(|_| {
                ConfigError::InvalidValue(
                    "DEFAULT_RETRY_CAP".to_string(),
                    "must be an integer".to_string(),
                )
            })?,
            enforce_env_validation,
        };

        Ok(config)
    }
}

fn env_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Fetches a required var; if `ENFORCE_ENV_VALIDATION` is set, a missing var
/// kills the process here rather than surfacing as a config error the caller
/// might swallow.
fn required_var(name: &str, enforce: bool) -> Result<String, ConfigError> {
    match env_var(name) {
        Ok(value) => Ok(value),
        Err(_) if enforce => {
            tracing::error!(var = name, "missing required environment variable, exiting");
            std::process::exit(1);
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or_uses_default() {
        let val = env_var_or("NON_EXISTENT_VAR_12345", "default_value");
        assert_eq!(val, "default_value");
    }

    #[test]
    fn env_flag_parses_truthy_values() {
        unsafe {
            env::set_var("TEST_FLAG_12345", "1");
        }
        assert!(env_flag("TEST_FLAG_12345"));
        unsafe {
            env::remove_var("TEST_FLAG_12345");
        }
    }
}
