//! Configuration management for release-radar
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Batch scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Spotify Web API configuration
    #[serde(default)]
    pub spotify: SpotifyConfig,

    /// Rate-limit retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables with prefix RELEASE_RADAR_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(hours) = std::env::var("RELEASE_RADAR_SCHEDULER_INTERVAL_HOURS") {
            config.scheduler.interval_hours = hours
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid scheduler interval".to_string()))?;
        }
        if let Ok(on_startup) = std::env::var("RELEASE_RADAR_SCHEDULER_RUN_ON_STARTUP") {
            config.scheduler.run_on_startup = on_startup.parse().unwrap_or(true);
        }

        if let Ok(client_id) = std::env::var("RELEASE_RADAR_SPOTIFY_CLIENT_ID") {
            config.spotify.client_id = client_id;
        }
        if let Ok(secret) = std::env::var("RELEASE_RADAR_SPOTIFY_CLIENT_SECRET") {
            config.spotify.client_secret = secret;
        }
        if let Ok(url) = std::env::var("RELEASE_RADAR_SPOTIFY_API_BASE_URL") {
            config.spotify.api_base_url = url;
        }
        if let Ok(url) = std::env::var("RELEASE_RADAR_SPOTIFY_ACCOUNTS_BASE_URL") {
            config.spotify.accounts_base_url = url;
        }

        if let Ok(path) = std::env::var("RELEASE_RADAR_DATABASE_PATH") {
            config.database.path = path;
        }

        if let Ok(enabled) = std::env::var("RELEASE_RADAR_OTEL_ENABLED") {
            config.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(endpoint) = std::env::var("RELEASE_RADAR_OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        if let Ok(level) = std::env::var("RELEASE_RADAR_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("RELEASE_RADAR_LOG_FORMAT") {
            config.logging.format = format;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.interval_hours == 0 {
            return Err(ConfigError::InvalidValue(
                "scheduler.interval_hours must be greater than 0".to_string(),
            ));
        }
        if self.spotify.page_size == 0 || self.spotify.page_size > 50 {
            return Err(ConfigError::InvalidValue(
                "spotify.page_size must be between 1 and 50".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "retry.backoff_multiplier must be a finite number of at least 1".to_string(),
            ));
        }
        if self.otel.enabled && self.otel.endpoint.is_none() {
            return Err(ConfigError::MissingRequired("otel.endpoint".to_string()));
        }
        Ok(())
    }
}

/// Batch scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Hours between batches
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Delay before the first batch
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Random jitter added to the initial delay (0 disables)
    #[serde(default)]
    pub jitter_secs: u64,

    /// Upper bound for a single task run
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Run a batch right after startup
    #[serde(default = "default_run_on_startup")]
    pub run_on_startup: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            initial_delay_secs: default_initial_delay(),
            jitter_secs: 0,
            run_timeout_secs: default_run_timeout(),
            run_on_startup: default_run_on_startup(),
        }
    }
}

fn default_interval_hours() -> u64 {
    24
}

fn default_initial_delay() -> u64 {
    5
}

fn default_run_timeout() -> u64 {
    3600
}

fn default_run_on_startup() -> bool {
    true
}

/// Spotify Web API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpotifyConfig {
    /// Web API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Accounts service base URL (token refresh)
    #[serde(default = "default_accounts_base_url")]
    pub accounts_base_url: String,

    /// OAuth client id
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,

    /// Page size for album and track listings
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Album groups requested from the artist albums endpoint
    #[serde(default = "default_include_groups")]
    pub include_groups: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Delay used when a 429 carries no usable Retry-After header
    #[serde(default = "default_retry_after")]
    pub default_retry_after_secs: u64,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            accounts_base_url: default_accounts_base_url(),
            client_id: String::new(),
            client_secret: String::new(),
            page_size: default_page_size(),
            include_groups: default_include_groups(),
            request_timeout_secs: default_request_timeout(),
            default_retry_after_secs: default_retry_after(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.spotify.com".to_string()
}

fn default_accounts_base_url() -> String {
    "https://accounts.spotify.com".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_include_groups() -> String {
    "album,single".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_retry_after() -> u64 {
    5
}

/// Retry configuration for rate-limited catalog calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay used when the error carries none
    #[serde(default = "default_retry_after")]
    pub default_retry_after_secs: u64,

    /// Growth factor applied per attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for a single backoff sleep
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            default_retry_after_secs: default_retry_after(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff() -> u64 {
    300
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "/data/db/release-radar.db".to_string()
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "release-radar".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand `${VAR_NAME}` references; unknown variables are left as written
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
