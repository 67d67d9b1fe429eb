//! services/client/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

pub const DEVELOPMENT_ENDPOINT: &str = "http://localhost:8081/api/medical-assistant/";
pub const PRODUCTION_ENDPOINT: &str =
    "https://aid-dermatilogy-cbfbbad0cdhscbf9.spaincentral-01.azurewebsites.net/api/medical-assistant/";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which diagnosis endpoint is used when `API_BASE_URL` is not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Development,
    Production,
}

/// Where the origin-scoped storage lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// Process-local; only sessions inside this process share it.
    Memory,
    /// A SQLite file shared by every process that opens it.
    File(PathBuf),
}

/// Cosmetic delays of the simulated flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Delay between two revealed characters.
    pub typing_interval: Duration,
    /// Simulated hand-off latency before a physician shows as connected.
    pub physician_connect_delay: Duration,
    /// Simulated analysis time on the doctor dashboard.
    pub case_analysis_delay: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            typing_interval: Duration::from_millis(30),
            physician_connect_delay: Duration::from_millis(3000),
            case_analysis_delay: Duration::from_millis(2000),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub mode: AppMode,
    pub api_base_url: String,
    pub storage: StorageLocation,
    pub storage_poll_interval: Duration,
    pub timings: SessionTimings,
    pub request_timeout: Option<Duration>,
    pub csrf_token: Option<String>,
    pub screen_width: u32,
    pub log_level: Level,
}

fn parse_millis(name: &str, raw: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    match raw {
        None => Ok(Duration::from_millis(default)),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
    }
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

    /// Builds the configuration from any key lookup. `from_env` uses the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Endpoint Selection ---
        let mode = match lookup("APP_MODE").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("production") => AppMode::Production,
            Some("development") => AppMode::Development,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "APP_MODE".to_string(),
                    format!("'{}' is not development or production", other),
                ))
            }
        };

        let api_base_url = lookup("API_BASE_URL").unwrap_or_else(|| match mode {
            AppMode::Development => DEVELOPMENT_ENDPOINT.to_string(),
            AppMode::Production => PRODUCTION_ENDPOINT.to_string(),
        });
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "API_BASE_URL".to_string(),
                format!("'{}' is not an http(s) URL", api_base_url),
            ));
        }

        // --- Storage ---
        let storage = match lookup("STORAGE_PATH") {
            Some(path) if path == ":memory:" => StorageLocation::Memory,
            Some(path) => StorageLocation::File(PathBuf::from(path)),
            None => {
                let home = lookup("HOME").ok_or_else(|| ConfigError::MissingVar("HOME".to_string()))?;
                StorageLocation::File(
                    PathBuf::from(home)
                        .join(".dermassist")
                        .join("storage.db"),
                )
            }
        };
        let storage_poll_interval =
            parse_millis("STORAGE_POLL_MS", lookup("STORAGE_POLL_MS"), 250)?;
        if storage_poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "STORAGE_POLL_MS".to_string(),
                "the poll interval must be at least 1 ms".to_string(),
            ));
        }

        // --- Simulated Delays ---
        let timings = SessionTimings {
            typing_interval: parse_millis("TYPING_INTERVAL_MS", lookup("TYPING_INTERVAL_MS"), 30)?,
            physician_connect_delay: parse_millis(
                "PHYSICIAN_CONNECT_DELAY_MS",
                lookup("PHYSICIAN_CONNECT_DELAY_MS"),
                3000,
            )?,
            case_analysis_delay: parse_millis(
                "CASE_ANALYSIS_DELAY_MS",
                lookup("CASE_ANALYSIS_DELAY_MS"),
                2000,
            )?,
        };

        // --- Transport ---
        let request_timeout = match lookup("REQUEST_TIMEOUT_SECS") {
            None => None,
            Some(raw) => Some(Duration::from_secs(raw.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("REQUEST_TIMEOUT_SECS".to_string(), e.to_string())
            })?)),
        };
        let csrf_token = lookup("CSRF_TOKEN").filter(|t| !t.is_empty());

        let screen_width = match lookup("SCREEN_WIDTH") {
            None => dermassist_core::domain::DEFAULT_SCREEN_WIDTH,
            Some(raw) => raw.trim().parse::<u32>().map_err(|e| {
                ConfigError::InvalidValue("SCREEN_WIDTH".to_string(), e.to_string())
            })?,
        };

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            mode,
            api_base_url,
            storage,
            storage_poll_interval,
            timings,
            request_timeout,
            csrf_token,
            screen_width,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_target_production() {
        let config = load(&[("HOME", "/home/patient")]).unwrap();
        assert_eq!(config.mode, AppMode::Production);
        assert_eq!(config.api_base_url, PRODUCTION_ENDPOINT);
        assert_eq!(
            config.storage,
            StorageLocation::File(PathBuf::from("/home/patient/.dermassist/storage.db"))
        );
        assert_eq!(config.timings, SessionTimings::default());
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn development_mode_uses_local_endpoint() {
        let config = load(&[("APP_MODE", "development"), ("STORAGE_PATH", ":memory:")]).unwrap();
        assert_eq!(config.api_base_url, DEVELOPMENT_ENDPOINT);
        assert_eq!(config.storage, StorageLocation::Memory);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("STORAGE_PATH", "/tmp/derm.db"),
            ("API_BASE_URL", "http://127.0.0.1:9000/api/medical-assistant/"),
            ("TYPING_INTERVAL_MS", "5"),
            ("REQUEST_TIMEOUT_SECS", "20"),
            ("CSRF_TOKEN", "abc123"),
            ("RUST_LOG", "debug"),
        ])
        .unwrap();
        assert_eq!(config.timings.typing_interval, Duration::from_millis(5));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(20)));
        assert_eq!(config.csrf_token.as_deref(), Some("abc123"));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn invalid_values_are_reported() {
        assert!(matches!(
            load(&[("STORAGE_PATH", ":memory:"), ("TYPING_INTERVAL_MS", "fast")]),
            Err(ConfigError::InvalidValue(name, _)) if name == "TYPING_INTERVAL_MS"
        ));
        assert!(matches!(
            load(&[("STORAGE_PATH", ":memory:"), ("APP_MODE", "staging")]),
            Err(ConfigError::InvalidValue(name, _)) if name == "APP_MODE"
        ));
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(name)) if name == "HOME"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        assert!(matches!(
            load(&[("STORAGE_PATH", ":memory:"), ("STORAGE_POLL_MS", "0")]),
            Err(ConfigError::InvalidValue(name, _)) if name == "STORAGE_POLL_MS"
        ));
        let config = load(&[("STORAGE_PATH", ":memory:"), ("STORAGE_POLL_MS", "1")]).unwrap();
        assert_eq!(config.storage_poll_interval, Duration::from_millis(1));
    }
}
