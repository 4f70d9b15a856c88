//! Fetch-or-cache access to Search Console performance data
//!
//! `PerformanceService` is the single entry point the presentation layer uses.
//! Every query shape is keyed by its parameters; a hit is returned verbatim, a
//! miss costs exactly one upstream call whose result (rows or error) is stored
//! with the TTL for its kind. Failures never escape as `Err`: callers always
//! get a `PerformanceOutcome`.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::auth::AuthProvider;
use crate::cache::{CacheError, QueryParams, Store};
use crate::config::PerformanceConfig;
use crate::data::{
    filter_sites, ApiError, CachedPayload, DimensionFilter, ErrorKind, ErrorResult,
    PerformanceOutcome, SearchAnalyticsQuery, SitesOutcome,
};

/// Dimension every performance query groups by
const PAGE_DIMENSION: &str = "page";

/// Cached, error-containing access to the Search Console API
pub struct PerformanceService {
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn Store>,
    config: PerformanceConfig,
}

impl PerformanceService {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn Store>,
        config: PerformanceConfig,
    ) -> Self {
        Self {
            auth,
            store,
            config,
        }
    }

    /// Performance rows for `property` between two dates, optionally for one page
    ///
    /// Dates are passed through as given. Returns `Unauthenticated` without
    /// touching the store when no client is available.
    pub async fn get_performance_data(
        &self,
        property: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        page_url: Option<&str>,
    ) -> PerformanceOutcome {
        let Some(client) = self.auth.client() else {
            tracing::debug!(property, "Not authenticated; skipping performance lookup");
            return PerformanceOutcome::Unauthenticated;
        };

        let params =
            QueryParams::performance(property, start_date, end_date, page_url.map(str::to_string));
        let key = params.cache_key();
        tracing::debug!(
            %key,
            property,
            page_url = page_url.unwrap_or(""),
            %start_date,
            %end_date,
            "Checking cache"
        );

        match self.store.get(key.as_str()) {
            Ok(Some(cached)) => {
                tracing::debug!(%key, "Cache hit");
                return cached.into();
            }
            Ok(None) => tracing::debug!(%key, "Cache miss"),
            Err(e) => tracing::warn!(%key, error = %e, "Cache read failed; treating as miss"),
        }

        let query = self.build_query(&params);
        tracing::info!(
            property,
            page_url = page_url.unwrap_or(""),
            %start_date,
            %end_date,
            "Querying searchAnalytics"
        );

        let (payload, ttl) = match client.query_search_analytics(property, &query).await {
            Ok(mut rows) => {
                rows.truncate(self.config.row_limit as usize);
                tracing::debug!(%key, rows = rows.len(), "Query succeeded; caching result");
                (CachedPayload::Rows(rows), self.config.success_ttl)
            }
            Err(e) => {
                log_api_error("performance data", &e);
                let error = ErrorResult {
                    kind: error_kind(&e),
                    message: e.message(),
                };
                (CachedPayload::Error(error), self.config.error_ttl)
            }
        };

        if let Err(e) = self.store.set(key.as_str(), &payload, ttl) {
            tracing::warn!(%key, error = %e, "Failed to cache query result");
        }

        payload.into()
    }

    /// Properties visible to the credential that belong to the site at `site_host`
    ///
    /// Site listings are not cached; the list is only needed when configuring.
    pub async fn get_filtered_sites(&self, site_host: &str) -> SitesOutcome {
        let Some(client) = self.auth.client() else {
            return SitesOutcome::Unauthenticated;
        };

        tracing::info!(site_host, "Fetching site list");
        match client.list_sites().await {
            Ok(sites) => {
                let filtered = filter_sites(&sites, site_host);
                tracing::info!(
                    total = sites.len(),
                    matching = filtered.len(),
                    "Fetched and filtered site list"
                );
                SitesOutcome::Sites(filtered)
            }
            Err(e) => {
                log_api_error("sites", &e);
                SitesOutcome::Error(e.message())
            }
        }
    }

    /// Removes every cached result; returns how many entries were removed
    pub fn clear_cache(&self) -> Result<usize, CacheError> {
        let removed = self.store.clear_all()?;
        tracing::info!(removed, "Cache cleared");
        Ok(removed)
    }

    /// Number of cached results currently stored
    pub fn cache_count(&self) -> Result<usize, CacheError> {
        self.store.count()
    }

    fn build_query(&self, params: &QueryParams) -> SearchAnalyticsQuery {
        let filters = params
            .page_url()
            .map(|page| vec![DimensionFilter::equals(PAGE_DIMENSION, page)])
            .unwrap_or_default();

        SearchAnalyticsQuery {
            start_date: params.start_date(),
            end_date: params.end_date(),
            dimensions: vec![PAGE_DIMENSION.to_string()],
            row_limit: self.config.row_limit,
            filters,
        }
    }
}

fn error_kind(error: &ApiError) -> ErrorKind {
    if error.is_auth_error() {
        ErrorKind::Permission
    } else {
        ErrorKind::Upstream
    }
}

fn log_api_error(context: &str, error: &ApiError) {
    tracing::error!(
        status = ?error.status(),
        error = %error,
        "Search Console API error fetching {}",
        context
    );
    if error.is_auth_error() {
        tracing::warn!(
            "Authentication error (401/403) fetching {}. Check the access token and the account's permissions on the property.",
            context
        );
    }
}
