//! End-to-end tests for the fetch-or-cache flow
//!
//! A stub upstream counts its calls; a manual clock drives expiry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tempfile::TempDir;

use gscdata::auth::AuthProvider;
use gscdata::cache::{CacheError, CacheManager, ManualClock, MemoryStore, QueryParams, Store};
use gscdata::config::PerformanceConfig;
use gscdata::data::{
    ApiError, CachedPayload, ErrorKind, PerformanceOutcome, Row, SearchAnalyticsQuery,
    SearchConsoleApi, SiteEntry, SitesOutcome,
};
use gscdata::PerformanceService;

const PROPERTY: &str = "https://example.com/";

/// Upstream returning a fixed response and counting calls
struct StubApi {
    calls: AtomicUsize,
    response: Mutex<Result<Vec<Row>, (u16, String)>>,
    sites: Vec<SiteEntry>,
}

impl StubApi {
    fn with_rows(rows: Vec<Row>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Mutex::new(Ok(rows)),
            sites: Vec::new(),
        })
    }

    fn failing(status: u16, message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Mutex::new(Err((status, message.to_string()))),
            sites: Vec::new(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond_with(&self, rows: Vec<Row>) {
        *self.response.lock().unwrap() = Ok(rows);
    }
}

#[async_trait]
impl SearchConsoleApi for StubApi {
    async fn list_sites(&self) -> Result<Vec<SiteEntry>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.sites.clone())
    }

    async fn query_search_analytics(
        &self,
        _property: &str,
        _query: &SearchAnalyticsQuery,
    ) -> Result<Vec<Row>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &*self.response.lock().unwrap() {
            Ok(rows) => Ok(rows.clone()),
            Err((status, message)) => Err(ApiError::Api {
                status: *status,
                message: message.clone(),
            }),
        }
    }
}

struct StubAuth(Option<Arc<dyn SearchConsoleApi>>);

impl AuthProvider for StubAuth {
    fn client(&self) -> Option<Arc<dyn SearchConsoleApi>> {
        self.0.clone()
    }
}

/// Store that counts every access and holds nothing
#[derive(Default)]
struct CountingStore {
    accesses: AtomicUsize,
}

impl CountingStore {
    fn touch(&self) {
        self.accesses.fetch_add(1, Ordering::SeqCst);
    }
}

impl Store for CountingStore {
    fn get(&self, _key: &str) -> Result<Option<CachedPayload>, CacheError> {
        self.touch();
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &CachedPayload, _ttl: Duration) -> Result<(), CacheError> {
        self.touch();
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        self.touch();
        Ok(false)
    }

    fn clear_all(&self) -> Result<usize, CacheError> {
        self.touch();
        Ok(0)
    }

    fn count(&self) -> Result<usize, CacheError> {
        self.touch();
        Ok(0)
    }

    fn expires_at(&self, _key: &str) -> Result<Option<DateTime<Utc>>, CacheError> {
        self.touch();
        Ok(None)
    }
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 10, 12, 0, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn row(page: &str, clicks: u64) -> Row {
    Row {
        page: page.to_string(),
        clicks,
        impressions: clicks * 20,
        ctr: 0.05,
        position: 4.2,
    }
}

fn three_rows() -> Vec<Row> {
    vec![
        row("https://example.com/", 120),
        row("https://example.com/blog/", 80),
        row("https://example.com/about/", 15),
    ]
}

fn service_with(api: Arc<StubApi>, store: Arc<dyn Store>) -> PerformanceService {
    PerformanceService::new(
        Arc::new(StubAuth(Some(api as Arc<dyn SearchConsoleApi>))),
        store,
        PerformanceConfig::default(),
    )
}

fn memory_store() -> (Arc<MemoryStore>, ManualClock) {
    let clock = ManualClock::new(start_time());
    let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
    (store, clock)
}

fn whole_site_key() -> String {
    QueryParams::performance(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .cache_key()
        .to_string()
}

#[tokio::test]
async fn test_cold_miss_fetches_and_caches_for_72_hours() {
    let api = StubApi::with_rows(three_rows());
    let (store, _clock) = memory_store();
    let service = service_with(api.clone(), store.clone());

    let outcome = service
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;

    assert_eq!(outcome, PerformanceOutcome::Rows(three_rows()));
    assert_eq!(api.calls(), 1);
    let expires_at = store.expires_at(&whole_site_key()).unwrap();
    assert_eq!(expires_at, Some(start_time() + chrono::Duration::hours(72)));
}

#[tokio::test]
async fn test_warm_hit_skips_upstream() {
    let api = StubApi::with_rows(three_rows());
    let (store, clock) = memory_store();
    let service = service_with(api.clone(), store);

    let first = service
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;
    clock.advance(Duration::from_secs(60 * 60));
    api.respond_with(vec![row("https://example.com/new/", 1)]);
    let second = service
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;

    assert_eq!(api.calls(), 1);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_success_entry_expires_after_72_hours() {
    let api = StubApi::with_rows(three_rows());
    let (store, clock) = memory_store();
    let service = service_with(api.clone(), store);

    service
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;
    clock.advance(Duration::from_secs(72 * 60 * 60));
    service
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;

    assert_eq!(api.calls(), 2);
}

#[tokio::test]
async fn test_different_page_urls_are_cached_separately() {
    let api = StubApi::with_rows(three_rows());
    let (store, _clock) = memory_store();
    let service = service_with(api.clone(), store.clone());

    for page in [None, Some("https://example.com/blog/"), Some("https://example.com/about/")] {
        service
            .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), page)
            .await;
    }

    assert_eq!(api.calls(), 3);
    assert_eq!(store.count().unwrap(), 3);
}

#[tokio::test]
async fn test_upstream_error_cached_for_five_minutes() {
    let api = StubApi::failing(500, "Backend Error");
    let (store, clock) = memory_store();
    let service = service_with(api.clone(), store);

    let first = service
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;
    match &first {
        PerformanceOutcome::Error(error) => {
            assert_eq!(error.kind, ErrorKind::Upstream);
            assert!(error.message.contains("Backend Error"));
        }
        other => panic!("expected error outcome, got {:?}", other),
    }

    clock.advance(Duration::from_secs(4 * 60));
    let cached = service
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;
    assert_eq!(api.calls(), 1);
    assert_eq!(cached, first);

    clock.advance(Duration::from_secs(61));
    service
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;
    assert_eq!(api.calls(), 2);
}

#[tokio::test]
async fn test_permission_errors_are_classified() {
    for status in [401, 403] {
        let api = StubApi::failing(status, "User does not have sufficient permission");
        let (store, _clock) = memory_store();
        let service = service_with(api, store);

        let outcome = service
            .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
            .await;

        match outcome {
            PerformanceOutcome::Error(error) => assert_eq!(error.kind, ErrorKind::Permission),
            other => panic!("expected permission error for {}, got {:?}", status, other),
        }
    }
}

#[tokio::test]
async fn test_empty_rows_use_success_ttl() {
    let api = StubApi::with_rows(Vec::new());
    let (store, clock) = memory_store();
    let service = service_with(api.clone(), store);

    let first = service
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;
    assert_eq!(first, PerformanceOutcome::Rows(Vec::new()));

    clock.advance(Duration::from_secs(71 * 60 * 60));
    let second = service
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;

    assert_eq!(api.calls(), 1);
    assert_eq!(second, PerformanceOutcome::Rows(Vec::new()));
}

#[tokio::test]
async fn test_unauthenticated_touches_neither_store_nor_upstream() {
    let store = Arc::new(CountingStore::default());
    let service = PerformanceService::new(
        Arc::new(StubAuth(None)),
        store.clone(),
        PerformanceConfig::default(),
    );

    let outcome = service
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;
    let sites = service.get_filtered_sites("example.com").await;

    assert_eq!(outcome, PerformanceOutcome::Unauthenticated);
    assert_eq!(sites, SitesOutcome::Unauthenticated);
    assert_eq!(store.accesses.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_more_rows_than_limit_are_truncated() {
    let rows: Vec<Row> = (0..25)
        .map(|n| row(&format!("https://example.com/{}/", n), 100 - n))
        .collect();
    let api = StubApi::with_rows(rows.clone());
    let (store, _clock) = memory_store();
    let service = service_with(api, store);

    let outcome = service
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;

    assert_eq!(outcome.rows().map(<[Row]>::len), Some(10));
    assert_eq!(outcome.rows().unwrap(), &rows[..10]);
}

#[tokio::test]
async fn test_filtered_sites_are_not_cached() {
    let api = Arc::new(StubApi {
        calls: AtomicUsize::new(0),
        response: Mutex::new(Ok(Vec::new())),
        sites: vec![
            SiteEntry {
                site_url: "sc-domain:example.com".to_string(),
                permission_level: Some("siteOwner".to_string()),
            },
            SiteEntry {
                site_url: "https://www.example.com/".to_string(),
                permission_level: Some("siteFullUser".to_string()),
            },
            SiteEntry {
                site_url: "https://other.org/".to_string(),
                permission_level: Some("siteOwner".to_string()),
            },
        ],
    });
    let (store, _clock) = memory_store();
    let service = service_with(api.clone(), store.clone());

    let first = service.get_filtered_sites("www.example.com").await;
    let second = service.get_filtered_sites("www.example.com").await;

    assert_eq!(
        first,
        SitesOutcome::Sites(vec![
            "sc-domain:example.com".to_string(),
            "https://www.example.com/".to_string(),
        ])
    );
    assert_eq!(first, second);
    assert_eq!(api.calls(), 2);
    assert_eq!(store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_disk_cache_survives_service_restart() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::new(start_time());
    let api = StubApi::with_rows(three_rows());

    let disk_store = || {
        Arc::new(
            CacheManager::with_dir(temp_dir.path().to_path_buf())
                .with_clock(Arc::new(clock.clone())),
        )
    };

    let first = service_with(api.clone(), disk_store())
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;
    clock.advance(Duration::from_secs(24 * 60 * 60));
    let second = service_with(api.clone(), disk_store())
        .get_performance_data(PROPERTY, date(2024, 1, 1), date(2024, 1, 31), None)
        .await;

    assert_eq!(api.calls(), 1);
    assert_eq!(first, second);
    assert_eq!(disk_store().count().unwrap(), 1);
}
