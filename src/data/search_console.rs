//! Google Search Console API client
//!
//! This module provides the upstream seam (`SearchConsoleApi`) and a reqwest
//! implementation against the Webmasters v3 REST endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Row, SiteEntry};

/// Base URL for the Search Console (Webmasters v3) API
const SEARCH_CONSOLE_BASE_URL: &str = "https://www.googleapis.com/webmasters/v3";

/// Errors that can occur when calling the Search Console API
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The API answered with a non-success status
    #[error("({status}) {message}")]
    Api { status: u16, message: String },
}

impl ApiError {
    /// HTTP status reported by the API, if the failure came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            ApiError::RequestFailed(e) => e.status().map(|s| s.as_u16()),
            ApiError::ParseError(_) => None,
        }
    }

    /// Whether the failure means the credential lacks access (401/403)
    pub fn is_auth_error(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// The upstream message without the status prefix
    pub fn message(&self) -> String {
        match self {
            ApiError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// An exact-match constraint on one dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionFilter {
    pub dimension: String,
    pub operator: String,
    pub expression: String,
}

impl DimensionFilter {
    /// Restricts results to rows whose `dimension` equals `expression`
    pub fn equals(dimension: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            operator: "equals".to_string(),
            expression: expression.into(),
        }
    }
}

/// Parameters of a searchAnalytics.query call
#[derive(Debug, Clone, PartialEq)]
pub struct SearchAnalyticsQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dimensions: Vec<String>,
    pub row_limit: u32,
    pub filters: Vec<DimensionFilter>,
}

/// The upstream metrics API as consumed by the performance service
#[async_trait]
pub trait SearchConsoleApi: Send + Sync {
    /// Lists every property the credential can see
    async fn list_sites(&self) -> Result<Vec<SiteEntry>, ApiError>;

    /// Runs a search analytics query against one property
    async fn query_search_analytics(
        &self,
        property: &str,
        query: &SearchAnalyticsQuery,
    ) -> Result<Vec<Row>, ApiError>;
}

/// Supplies the bearer token sent with each request
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, ApiError>;
}

/// A token fixed for the life of the client
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, ApiError> {
        Ok(self.0.clone())
    }
}

/// Client for the Search Console REST API authenticated with a bearer token
#[derive(Clone)]
pub struct SearchConsoleClient {
    client: Client,
    tokens: Arc<dyn TokenSource>,
    base_url: String,
}

impl SearchConsoleClient {
    /// Create a new client with a custom HTTP client
    pub fn with_client(client: Client, access_token: impl Into<String>) -> Self {
        Self::with_token_source(client, Arc::new(StaticToken::new(access_token)))
    }

    /// Create a client whose tokens come from `tokens`, e.g. a service account
    pub fn with_token_source(client: Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            tokens,
            base_url: SEARCH_CONSOLE_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (for testing against a local server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn query_url(&self, property: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(property.as_bytes()).collect();
        format!("{}/sites/{}/searchAnalytics/query", self.base_url, encoded)
    }

    /// Reads a response body, turning non-success statuses into `ApiError::Api`
    async fn read_body(response: reqwest::Response) -> Result<String, ApiError> {
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            Ok(text)
        } else {
            Err(error_from_body(status, &text))
        }
    }
}

#[async_trait]
impl SearchConsoleApi for SearchConsoleClient {
    async fn list_sites(&self) -> Result<Vec<SiteEntry>, ApiError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(format!("{}/sites", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        let text = Self::read_body(response).await?;
        parse_sites(&text)
    }

    async fn query_search_analytics(
        &self,
        property: &str,
        query: &SearchAnalyticsQuery,
    ) -> Result<Vec<Row>, ApiError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(self.query_url(property))
            .bearer_auth(token)
            .json(&QueryRequestBody::from(query))
            .send()
            .await?;
        let text = Self::read_body(response).await?;
        parse_rows(&text)
    }
}

/// HTTP client shared by the API and token endpoints
pub fn http_client() -> Result<Client, ApiError> {
    Ok(Client::builder()
        .user_agent(concat!("gscdata/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Parse a sites.list response body into site entries
fn parse_sites(body: &str) -> Result<Vec<SiteEntry>, ApiError> {
    let response: SitesListResponse = serde_json::from_str(body)?;
    Ok(response
        .site_entry
        .into_iter()
        .map(|site| SiteEntry {
            site_url: site.site_url,
            permission_level: site.permission_level,
        })
        .collect())
}

/// Parse a searchAnalytics.query response body into rows
///
/// The API omits `rows` entirely when nothing matched; that is an empty result.
fn parse_rows(body: &str) -> Result<Vec<Row>, ApiError> {
    let response: QueryResponse = serde_json::from_str(body)?;
    Ok(response
        .rows
        .into_iter()
        .map(|row| Row {
            page: row.keys.into_iter().next().unwrap_or_default(),
            clicks: row.clicks.max(0.0) as u64,
            impressions: row.impressions.max(0.0) as u64,
            ctr: row.ctr,
            position: row.position,
        })
        .collect())
}

/// Build an `ApiError` from an error response, preferring Google's error envelope
fn error_from_body(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });
    ApiError::Api {
        status: status.as_u16(),
        message,
    }
}

/// JSON body of a searchAnalytics.query request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequestBody<'a> {
    start_date: NaiveDate,
    end_date: NaiveDate,
    dimensions: &'a [String],
    row_limit: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dimension_filter_groups: Vec<FilterGroup<'a>>,
}

#[derive(Debug, Serialize)]
struct FilterGroup<'a> {
    filters: &'a [DimensionFilter],
}

impl<'a> From<&'a SearchAnalyticsQuery> for QueryRequestBody<'a> {
    fn from(query: &'a SearchAnalyticsQuery) -> Self {
        let dimension_filter_groups = if query.filters.is_empty() {
            Vec::new()
        } else {
            vec![FilterGroup {
                filters: &query.filters,
            }]
        };
        Self {
            start_date: query.start_date,
            end_date: query.end_date,
            dimensions: &query.dimensions,
            row_limit: query.row_limit,
            dimension_filter_groups,
        }
    }
}

/// sites.list response structure
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SitesListResponse {
    #[serde(default)]
    site_entry: Vec<ApiSite>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSite {
    site_url: String,
    permission_level: Option<String>,
}

/// searchAnalytics.query response structure
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<ApiRow>,
}

/// Metrics arrive as JSON numbers with a fractional part
#[derive(Debug, Deserialize)]
struct ApiRow {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    clicks: f64,
    #[serde(default)]
    impressions: f64,
    #[serde(default)]
    ctr: f64,
    #[serde(default)]
    position: f64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
