//! Core data models for Search Console performance data
//!
//! This module contains the row and site types returned by the upstream API,
//! plus the tagged outcome types handed to the presentation layer.

pub mod search_console;
pub mod sites;

pub use search_console::{
    http_client, ApiError, DimensionFilter, SearchAnalyticsQuery, SearchConsoleApi,
    SearchConsoleClient, StaticToken, TokenSource,
};
pub use sites::{base_domain, filter_sites, site_host};

use serde::{Deserialize, Serialize};

/// One row of search analytics data for a single page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Page URL (value of the `page` dimension)
    pub page: String,
    /// Number of clicks from search results
    pub clicks: u64,
    /// Number of times the page appeared in search results
    pub impressions: u64,
    /// Click-through rate as a fraction in [0, 1]
    pub ctr: f64,
    /// Average ranking position (1 is the top)
    pub position: f64,
}

/// A Search Console property visible to the authenticated credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteEntry {
    /// Property identifier, e.g. `https://example.com/` or `sc-domain:example.com`
    pub site_url: String,
    /// The credential's permission level on the property
    pub permission_level: Option<String>,
}

/// Category of a failed upstream call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The API rejected the credential (HTTP 401/403)
    Permission,
    /// Any other API, transport or decoding failure
    Upstream,
}

/// A failed performance query, as cached and shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub kind: ErrorKind,
    pub message: String,
}

/// Value written to the store for one query shape.
///
/// Successes and failures are both cached (with different TTLs), so the
/// store holds a tagged payload rather than bare rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CachedPayload {
    Rows(Vec<Row>),
    Error(ErrorResult),
}

/// Result of a performance query as seen by callers
#[derive(Debug, Clone, PartialEq)]
pub enum PerformanceOutcome {
    /// Upstream data; may be empty, which means "no data" rather than a failure
    Rows(Vec<Row>),
    /// The upstream call failed (possibly a cached failure)
    Error(ErrorResult),
    /// No authenticated client could be obtained
    Unauthenticated,
}

impl PerformanceOutcome {
    /// Returns the rows if this is a successful outcome
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            PerformanceOutcome::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

impl From<CachedPayload> for PerformanceOutcome {
    fn from(payload: CachedPayload) -> Self {
        match payload {
            CachedPayload::Rows(rows) => PerformanceOutcome::Rows(rows),
            CachedPayload::Error(error) => PerformanceOutcome::Error(error),
        }
    }
}

/// Result of listing the properties that belong to the configured site
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitesOutcome {
    Sites(Vec<String>),
    Error(String),
    Unauthenticated,
}
