//! Command-line interface parsing for gscdata
//!
//! This module handles parsing of CLI arguments using clap and resolving them
//! against the loaded settings into the options a command runs with.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;
use url::Url;

use crate::config::{DateRange, Settings};
use crate::data::site_host;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The requested date range is not one of the supported periods
    #[error("Invalid date range: '{0}'. Valid ranges: 30, 90, 180, 365")]
    InvalidDateRange(u32),

    /// A page argument is not an absolute URL
    #[error("Invalid page URL: '{0}'. Pages must be absolute URLs, e.g. https://example.com/about/")]
    InvalidPageUrl(String),

    /// No property is configured or given with --property
    #[error("No property selected. Set selected_property in the config file or pass --property")]
    MissingProperty,

    /// `sites` needs to know which site to match
    #[error("No site URL configured. Set site_url in the config file or pass --site-url")]
    MissingSiteUrl,

    /// A site URL has no host to match properties against
    #[error("Invalid site URL: '{0}'. Expected an absolute URL such as https://example.com/")]
    InvalidSiteUrl(String),
}

/// gscdata - Google Search Console performance data for your site
#[derive(Parser, Debug)]
#[command(name = "gscdata")]
#[command(about = "Google Search Console clicks, impressions, CTR and position for your pages")]
#[command(version)]
pub struct Cli {
    /// Path to the config file (defaults to the XDG config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Reporting period in days, overriding the config (30, 90, 180 or 365)
    #[arg(long, global = true, value_name = "DAYS")]
    pub days: Option<u32>,

    /// Search Console property to query, overriding the config
    ///
    /// Either a URL prefix (https://example.com/) or a domain property (sc-domain:example.com)
    #[arg(long, global = true, value_name = "PROPERTY")]
    pub property: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the status line and metrics for a single page
    Page {
        /// Absolute URL of the page
        url: String,
    },
    /// Show metric columns for several pages
    Columns {
        /// Absolute URLs of the pages
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Show the top pages of the whole property
    Site,
    /// List the Search Console properties that belong to the configured site
    Sites {
        /// Site URL to match against, overriding the config
        #[arg(long, value_name = "URL")]
        site_url: Option<String>,
    },
    /// Manage cached results
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Manage the debug log file
    Log {
        #[command(subcommand)]
        action: LogAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Delete every cached result
    Clear,
    /// Print how many results are cached
    Count,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogAction {
    /// Delete the debug log file
    Clear,
    /// Print where the debug log is written
    Path,
}

/// Parses a `--days` argument into a DateRange.
///
/// # Returns
/// * `Ok(DateRange)` for 30, 90, 180 or 365
/// * `Err(CliError::InvalidDateRange)` otherwise
pub fn parse_date_range_arg(days: u32) -> Result<DateRange, CliError> {
    DateRange::try_from(days).map_err(|_| CliError::InvalidDateRange(days))
}

/// Checks that a page argument is an absolute http(s) URL
pub fn parse_page_url_arg(s: &str) -> Result<String, CliError> {
    match Url::parse(s) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
            Ok(s.to_string())
        }
        _ => Err(CliError::InvalidPageUrl(s.to_string())),
    }
}

/// Extracts the host of a site URL given to `sites`
pub fn parse_site_url_arg(s: &str) -> Result<String, CliError> {
    site_host(s).ok_or_else(|| CliError::InvalidSiteUrl(s.to_string()))
}

/// Options a query command runs with, after merging CLI flags over settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub date_range: DateRange,
    pub property: Option<String>,
}

impl QueryOptions {
    /// Resolves CLI overrides against the settings.
    ///
    /// # Returns
    /// * `Ok(QueryOptions)` with CLI values taking precedence
    /// * `Err(CliError)` if `--days` is not a supported range
    pub fn resolve(cli: &Cli, settings: &Settings) -> Result<Self, CliError> {
        let date_range = match cli.days {
            Some(days) => parse_date_range_arg(days)?,
            None => settings.date_range,
        };
        let property = cli
            .property
            .clone()
            .or_else(|| settings.selected_property.clone());
        Ok(Self {
            date_range,
            property,
        })
    }

    /// The property to query, or an error if none is configured
    pub fn require_property(&self) -> Result<&str, CliError> {
        self.property.as_deref().ok_or(CliError::MissingProperty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_range_arg_valid() {
        assert_eq!(parse_date_range_arg(30).unwrap(), DateRange::Last30Days);
        assert_eq!(parse_date_range_arg(90).unwrap(), DateRange::Last90Days);
        assert_eq!(parse_date_range_arg(180).unwrap(), DateRange::Last180Days);
        assert_eq!(parse_date_range_arg(365).unwrap(), DateRange::Last365Days);
    }

    #[test]
    fn test_parse_date_range_arg_invalid() {
        let err = parse_date_range_arg(45).unwrap_err();
        assert!(err.to_string().contains("Invalid date range"));
        assert!(err.to_string().contains("45"));
    }

    #[test]
    fn test_parse_page_url_arg() {
        assert!(parse_page_url_arg("https://example.com/about/").is_ok());
        assert!(parse_page_url_arg("http://example.com").is_ok());
        assert!(parse_page_url_arg("example.com/about").is_err());
        assert!(parse_page_url_arg("ftp://example.com/file").is_err());
        assert!(parse_page_url_arg("sc-domain:example.com").is_err());
    }

    #[test]
    fn test_parse_site_url_arg() {
        assert_eq!(
            parse_site_url_arg("https://www.example.com/blog/").unwrap(),
            "www.example.com"
        );

        let err = parse_site_url_arg("example.com").unwrap_err();
        assert!(matches!(err, CliError::InvalidSiteUrl(ref url) if url == "example.com"));
        assert!(err.to_string().contains("Invalid site URL"));
    }

    #[test]
    fn test_cli_parse_page() {
        let cli = Cli::parse_from(["gscdata", "page", "https://example.com/"]);
        assert_eq!(
            cli.command,
            Command::Page {
                url: "https://example.com/".to_string()
            }
        );
        assert!(cli.days.is_none());
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "gscdata",
            "site",
            "--days",
            "90",
            "--property",
            "sc-domain:example.com",
        ]);
        assert_eq!(cli.command, Command::Site);
        assert_eq!(cli.days, Some(90));
        assert_eq!(cli.property.as_deref(), Some("sc-domain:example.com"));
    }

    #[test]
    fn test_cli_parse_columns_requires_urls() {
        assert!(Cli::try_parse_from(["gscdata", "columns"]).is_err());
        let cli = Cli::parse_from(["gscdata", "columns", "https://a.com/", "https://a.com/b/"]);
        match cli.command {
            Command::Columns { urls } => assert_eq!(urls.len(), 2),
            other => panic!("expected columns, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_cache_and_log() {
        let cli = Cli::parse_from(["gscdata", "cache", "clear"]);
        assert_eq!(
            cli.command,
            Command::Cache {
                action: CacheAction::Clear
            }
        );
        let cli = Cli::parse_from(["gscdata", "log", "path"]);
        assert_eq!(
            cli.command,
            Command::Log {
                action: LogAction::Path
            }
        );
    }

    #[test]
    fn test_query_options_defaults_from_settings() {
        let cli = Cli::parse_from(["gscdata", "site"]);
        let settings = Settings {
            selected_property: Some("https://example.com/".to_string()),
            date_range: DateRange::Last180Days,
            ..Default::default()
        };

        let options = QueryOptions::resolve(&cli, &settings).unwrap();

        assert_eq!(options.date_range, DateRange::Last180Days);
        assert_eq!(options.require_property().unwrap(), "https://example.com/");
    }

    #[test]
    fn test_query_options_cli_overrides_settings() {
        let cli = Cli::parse_from([
            "gscdata",
            "site",
            "--days",
            "365",
            "--property",
            "sc-domain:b.com",
        ]);
        let settings = Settings {
            selected_property: Some("https://a.com/".to_string()),
            ..Default::default()
        };

        let options = QueryOptions::resolve(&cli, &settings).unwrap();

        assert_eq!(options.date_range, DateRange::Last365Days);
        assert_eq!(options.property.as_deref(), Some("sc-domain:b.com"));
    }

    #[test]
    fn test_query_options_invalid_days() {
        let cli = Cli::parse_from(["gscdata", "site", "--days", "7"]);
        let result = QueryOptions::resolve(&cli, &Settings::default());
        assert!(matches!(result, Err(CliError::InvalidDateRange(7))));
    }

    #[test]
    fn test_missing_property() {
        let cli = Cli::parse_from(["gscdata", "site"]);
        let options = QueryOptions::resolve(&cli, &Settings::default()).unwrap();
        assert!(matches!(options.require_property(), Err(CliError::MissingProperty)));
    }
}
