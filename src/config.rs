//! Engine configuration.
//!
//! Values come from `HABIT_SYNC_*` environment variables, with `.env`
//! support through `dotenvy`.
//!
//! # Example
//!
//! ```rust,ignore
//! use habit_sync::config::EngineConfig;
//!
//! let config = EngineConfig::from_env()?;
//! println!("API: {}", config.api_base_url);
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Base URL of the habit API.
pub const API_URL_VAR: &str = "HABIT_SYNC_API_URL";
/// Per-request timeout in milliseconds.
pub const REQUEST_TIMEOUT_VAR: &str = "HABIT_SYNC_REQUEST_TIMEOUT_MS";
/// Coalescing window of the reconciliation listener in milliseconds.
pub const COALESCE_WINDOW_VAR: &str = "HABIT_SYNC_COALESCE_MS";

const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_COALESCE_WINDOW_MS: u64 = 0;

/// Configuration error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// The name of the environment variable.
        key: String,
        /// Description of why the value is invalid.
        message: String,
    },
}

/// Settings of the engine and its HTTP gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Root URL of the habit API.
    pub api_base_url: String,
    /// Timeout applied to every gateway request.
    pub request_timeout: Duration,
    /// Window during which push events are folded into one refetch.
    /// Zero refetches on every event.
    pub coalesce_window: Duration,
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `HABIT_SYNC_API_URL`: API root (required)
    /// - `HABIT_SYNC_REQUEST_TIMEOUT_MS`: request timeout (optional, default: 10000)
    /// - `HABIT_SYNC_COALESCE_MS`: coalescing window (optional, default: 0)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if a required variable is not set.
    /// Returns `ConfigError::InvalidValue` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors if file doesn't exist)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup` instead of the process
    /// environment.
    ///
    /// # Errors
    ///
    /// See [`EngineConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup(API_URL_VAR)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(API_URL_VAR.to_string()))?;
        let request_timeout = Duration::from_millis(parse_optional(
            &lookup,
            REQUEST_TIMEOUT_VAR,
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?);
        if request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: REQUEST_TIMEOUT_VAR.to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        let coalesce_window = Duration::from_millis(parse_optional(
            &lookup,
            COALESCE_WINDOW_VAR,
            DEFAULT_COALESCE_WINDOW_MS,
        )?);

        Ok(Self {
            api_base_url: api_base_url.trim().to_string(),
            request_timeout,
            coalesce_window,
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            coalesce_window: Duration::from_millis(DEFAULT_COALESCE_WINDOW_MS),
        }
    }
}

fn parse_optional<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|error: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: error.to_string(),
            }),
        None => Ok(default),
    }
}

/// Installs a global `tracing` subscriber filtered by `RUST_LOG`, falling
/// back to `default_directive`.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
