//! Application configuration, loaded from a JSON file.

use crate::alarm::TickerConfig;
use crate::bell::PlayerConfig;
use crate::service::ServiceConfig;
use crate::sync::ClientConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "BELL_SCHEDULER_CONFIG";

/// Config file used when neither the environment nor the command line names one.
pub const DEFAULT_CONFIG_PATH: &str = "bell_scheduler.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Every field has a default, so `{}` is a valid config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment URL of the schedule server
    pub source_url: String,
    /// SQLite file holding the last fetched schedule
    pub database_path: String,
    /// Address the HTTP API binds to
    pub listen_addr: String,
    /// One of trace, debug, info, warn, error
    pub log_level: String,

    pub horizon_days: u32,
    pub display_days: u32,

    pub poll_interval_ms: u64,
    pub fire_window_secs: u32,
    pub freshness_interval_secs: u64,
    pub startup_check_delay_ms: u64,

    pub manual_strike_count: u32,
    pub strike_spacing_ms: u64,
    pub first_strike_volume: f32,

    pub response_cache_ttl_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_url: "http://127.0.0.1:8080/exec".to_string(),
            database_path: "bell_scheduler.db".to_string(),
            listen_addr: "127.0.0.1:3000".to_string(),
            log_level: "info".to_string(),
            horizon_days: 180,
            display_days: 30,
            poll_interval_ms: 1000,
            fire_window_secs: 5,
            freshness_interval_secs: 300,
            startup_check_delay_ms: 2000,
            manual_strike_count: 4,
            strike_spacing_ms: 11_000,
            first_strike_volume: 0.35,
            response_cache_ttl_secs: crate::sync::DEFAULT_RESPONSE_TTL.as_secs(),
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 10_000,
            request_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Reads and validates the config at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: AppConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: display,
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.fire_window_secs >= 60 {
            return Err(ConfigError::Invalid(
                "fire_window_secs must be less than 60".into(),
            ));
        }
        // Ticks act during seconds 0..=fire_window_secs, so a longer poll could skip a minute
        let window_ms = (u64::from(self.fire_window_secs) + 1) * 1000;
        if self.poll_interval_ms > window_ms {
            return Err(ConfigError::Invalid(format!(
                "poll_interval_ms ({}) must not exceed the {}ms fire window",
                self.poll_interval_ms, window_ms
            )));
        }
        if self.freshness_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "freshness_interval_secs must be positive".into(),
            ));
        }
        if self.horizon_days == 0 {
            return Err(ConfigError::Invalid("horizon_days must be positive".into()));
        }
        if self.manual_strike_count == 0 {
            return Err(ConfigError::Invalid(
                "manual_strike_count must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.first_strike_volume) {
            return Err(ConfigError::Invalid(
                "first_strike_volume must be between 0 and 1".into(),
            ));
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry_base_delay_ms must not exceed retry_max_delay_ms".into(),
            ));
        }
        url::Url::parse(&self.source_url)
            .map_err(|e| ConfigError::Invalid(format!("source_url: {}", e)))?;
        self.tracing_level()?;
        Ok(())
    }

    pub fn tracing_level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log_level {:?}", self.log_level)))
    }

    pub fn ticker_config(&self) -> TickerConfig {
        TickerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            fire_window_secs: self.fire_window_secs,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.source_url.clone(),
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(self.retry_max_delay_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..ClientConfig::default()
        }
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            strike_spacing: Duration::from_millis(self.strike_spacing_ms),
            first_strike_volume: self.first_strike_volume,
            ..PlayerConfig::default()
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            horizon_days: self.horizon_days,
            display_days: self.display_days,
            manual_strike_count: self.manual_strike_count,
            freshness_interval: Duration::from_secs(self.freshness_interval_secs),
            startup_check_delay: Duration::from_millis(self.startup_check_delay_ms),
        }
    }

    pub fn response_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.response_cache_ttl_secs)
    }
}
