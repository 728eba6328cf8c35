use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::AutoUpdate;
use crate::realtime::ReconnectBackoff;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "INCIDENT_SYNC_CONFIG";

/// Prefix of environment overrides, e.g. `INCIDENT_SYNC__API__BASE_URL`
pub const ENV_PREFIX: &str = "INCIDENT_SYNC";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Incident API configuration
    #[validate(nested)]
    pub api: ApiConfig,

    /// Page size configuration
    #[validate(nested)]
    pub pagination: PaginationConfig,

    /// Realtime connection configuration
    #[serde(default)]
    #[validate(nested)]
    pub realtime: RealtimeConfig,

    /// Auto-update configuration
    #[serde(default)]
    #[validate(nested)]
    pub refresh: RefreshConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, the file named by
    /// `INCIDENT_SYNC_CONFIG` and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Same as [`Config::load`] with an explicit file. A missing file is not
    /// an error.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ));

        // Override with config file if given
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config: Config = builder
            // Override with environment variables (prefix: INCIDENT_SYNC__)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("pagination.page_size_options"),
            )
            .build()?
            .try_deserialize()?;

        config.check()?;
        Ok(config)
    }

    /// Field validation plus the cross-field rules
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if !self
            .pagination
            .page_size_options
            .contains(&self.pagination.default_page_size)
        {
            return Err(AppError::Configuration(format!(
                "default page size {} is not one of the page size options {:?}",
                self.pagination.default_page_size, self.pagination.page_size_options
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiConfig {
    /// Root URL of the incident API
    #[validate(url)]
    pub base_url: String,

    /// Path of the incidents list endpoint, appended to `base_url`
    #[serde(default = "default_incidents_path")]
    #[validate(length(min = 1))]
    pub incidents_path: String,

    /// Request timeout
    #[serde(default = "default_request_timeout")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    /// Full URL of the incidents list endpoint
    pub fn incidents_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.incidents_path.starts_with('/') {
            format!("{}{}", base, self.incidents_path)
        } else {
            format!("{}/{}", base, self.incidents_path)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaginationConfig {
    /// Page size of a new view
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1))]
    pub default_page_size: usize,

    /// Page sizes a view may switch to
    #[serde(default = "default_page_size_options")]
    #[validate(length(min = 1))]
    pub page_size_options: Vec<usize>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            page_size_options: default_page_size_options(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RealtimeConfig {
    /// Connect the push transport when a view starts
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// First reconnect delay after an unexpected close
    #[serde(default = "default_retry_initial")]
    #[validate(range(min = 1))]
    pub retry_initial_secs: u64,

    /// Growth factor of the reconnect delay
    #[serde(default = "default_retry_backoff_factor")]
    #[validate(range(min = 1))]
    pub retry_backoff_factor: u32,

    /// Upper bound of the reconnect delay
    #[serde(default = "default_retry_max")]
    #[validate(range(min = 1))]
    pub retry_max_secs: u64,
}

impl RealtimeConfig {
    pub fn backoff(&self) -> ReconnectBackoff {
        ReconnectBackoff::new(
            Duration::from_secs(self.retry_initial_secs),
            self.retry_backoff_factor,
            Duration::from_secs(self.retry_max_secs),
        )
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_initial_secs: default_retry_initial(),
            retry_backoff_factor: default_retry_backoff_factor(),
            retry_max_secs: default_retry_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RefreshConfig {
    /// How views keep themselves up to date
    #[serde(default)]
    pub auto_update: AutoUpdate,

    /// Seconds between refreshes in interval mode
    #[serde(default = "default_refresh_interval")]
    #[validate(range(min = 1))]
    pub interval_secs: u64,
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            auto_update: AutoUpdate::default(),
            interval_secs: default_refresh_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Register Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

fn default_incidents_path() -> String {
    "/api/v1/incidents/".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_page_size() -> usize {
    10
}

fn default_page_size_options() -> Vec<usize> {
    vec![10, 25, 50, 100]
}

fn default_retry_initial() -> u64 {
    1
}

fn default_retry_backoff_factor() -> u32 {
    2
}

fn default_retry_max() -> u64 {
    60
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
