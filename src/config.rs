//! Configuration for gscdata
//!
//! `Settings` is the user-editable TOML file; it is read once at startup and
//! handed to the components that need it. `PerformanceConfig` holds the cache
//! policy the performance service is constructed with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Days, NaiveDate};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How long successful query results stay cached (72 hours)
pub const SUCCESS_TTL: Duration = Duration::from_secs(72 * 60 * 60);

/// How long failed query results stay cached (5 minutes)
pub const ERROR_TTL: Duration = Duration::from_secs(5 * 60);

/// Maximum rows requested per query
pub const ROW_LIMIT: u32 = 10;

/// Search Console data lags behind; the reporting window ends this many days ago
pub const REPORTING_DELAY_DAYS: u64 = 3;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Reporting period offered to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DateRange {
    #[default]
    Last30Days,
    Last90Days,
    Last180Days,
    Last365Days,
}

impl DateRange {
    pub fn days(self) -> u32 {
        match self {
            DateRange::Last30Days => 30,
            DateRange::Last90Days => 90,
            DateRange::Last180Days => 180,
            DateRange::Last365Days => 365,
        }
    }

    /// The `(start, end)` dates for a report generated on `today`
    ///
    /// The window ends `REPORTING_DELAY_DAYS` before today and spans `days()` days.
    pub fn window(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = today
            .checked_sub_days(Days::new(REPORTING_DELAY_DAYS))
            .unwrap_or(today);
        let start = end
            .checked_sub_days(Days::new(u64::from(self.days())))
            .unwrap_or(end);
        (start, end)
    }
}

impl TryFrom<u32> for DateRange {
    type Error = String;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        match days {
            30 => Ok(DateRange::Last30Days),
            90 => Ok(DateRange::Last90Days),
            180 => Ok(DateRange::Last180Days),
            365 => Ok(DateRange::Last365Days),
            other => Err(format!(
                "unsupported date range {}; expected one of 30, 90, 180, 365",
                other
            )),
        }
    }
}

impl From<DateRange> for u32 {
    fn from(range: DateRange) -> Self {
        range.days()
    }
}

/// Where upstream credentials come from
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSettings {
    /// Contents of a service account JSON key
    pub service_account_json: Option<String>,
    /// Path to a service account JSON key file
    pub service_account_file: Option<PathBuf>,
    /// Token given inline; takes precedence over the token file
    pub access_token: Option<String>,
    /// File containing the token, e.g. written by `gcloud auth print-access-token`
    pub access_token_file: Option<PathBuf>,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secret = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("AuthSettings")
            .field("service_account_json", &secret(&self.service_account_json))
            .field("service_account_file", &self.service_account_file)
            .field("access_token", &secret(&self.access_token))
            .field("access_token_file", &self.access_token_file)
            .finish()
    }
}

/// User settings loaded from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Public URL of the managed site; its host selects matching properties
    pub site_url: Option<String>,
    /// Property queried for page performance
    pub selected_property: Option<String>,
    pub date_range: DateRange,
    /// Show CTR and position alongside clicks and impressions
    pub show_extra_columns: bool,
    /// Render clicks and impressions as one `clicks / impressions` cell
    pub combine_clicks_impressions: bool,
    /// Write a debug log file
    pub enable_logging: bool,
    /// Override for the cache directory
    pub cache_dir: Option<PathBuf>,
    pub auth: AuthSettings,
}

impl Settings {
    /// Loads settings from `path`, or from the default location when `None`
    ///
    /// A missing file at the default location yields default settings; an
    /// explicitly requested file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_path(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(site_url) = &self.site_url {
            if crate::data::site_host(site_url).is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "site_url",
                    reason: format!("'{}' is not an absolute URL with a host", site_url),
                });
            }
        }
        if let Some(property) = &self.selected_property {
            if property.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "selected_property",
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Cache directory to use, falling back to the XDG cache dir
    pub fn resolved_cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.cache_dir().to_path_buf()))
    }
}

/// Cache policy of the performance service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformanceConfig {
    /// TTL for successful results, including empty ones
    pub success_ttl: Duration,
    /// TTL for failed results; bounds how often a failing query is retried
    pub error_ttl: Duration,
    pub row_limit: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            success_ttl: SUCCESS_TTL,
            error_ttl: ERROR_TTL,
            row_limit: ROW_LIMIT,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "gscdata")
}

/// `~/.config/gscdata/config.toml` on Linux
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// `~/.local/share/gscdata/debug.log` on Linux
pub fn default_log_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("debug.log"))
}
