//! Deterministic cache keys for query parameters
//!
//! Parameters are collected into a name-ordered map, serialized as JSON (which
//! keeps `null`, `"30"` and `30` distinct) and digested with SHA-256. The result
//! does not depend on insertion order or on anything process-local.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Action tag used for page performance queries
pub const PERFORMANCE_DATA_ACTION: &str = "performance_data";

/// A scalar parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

/// A 64-character lowercase hex digest identifying one query shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Computes the cache key for a set of named parameters
///
/// Later duplicates of a name replace earlier ones.
pub fn generate_key<I, K>(params: I) -> CacheKey
where
    I: IntoIterator<Item = (K, ParamValue)>,
    K: Into<String>,
{
    let ordered: BTreeMap<String, ParamValue> =
        params.into_iter().map(|(k, v)| (k.into(), v)).collect();
    digest(&ordered)
}

fn digest(ordered: &BTreeMap<String, ParamValue>) -> CacheKey {
    let mut hasher = Sha256::new();
    serde_json::to_writer(&mut hasher, ordered)
        .expect("a string-keyed map of scalars always serializes");
    CacheKey(hex::encode(hasher.finalize()))
}

/// The parameters that identify one upstream query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    property: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    page_url: Option<String>,
    action: String,
}

impl QueryParams {
    /// Parameters for a `performance_data` query
    pub fn performance(
        property: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        page_url: Option<String>,
    ) -> Self {
        Self::new(property, start_date, end_date, page_url, PERFORMANCE_DATA_ACTION)
    }

    pub fn new(
        property: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        page_url: Option<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            property: property.into(),
            start_date,
            end_date,
            page_url,
            action: action.into(),
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Named scalar view of the parameters; a missing page URL is an explicit null
    pub fn to_params(&self) -> Vec<(&'static str, ParamValue)> {
        vec![
            ("property", self.property.as_str().into()),
            ("start_date", self.start_date.format("%Y-%m-%d").to_string().into()),
            ("end_date", self.end_date.format("%Y-%m-%d").to_string().into()),
            ("page_url", self.page_url.clone().into()),
            ("action", self.action.as_str().into()),
        ]
    }

    pub fn cache_key(&self) -> CacheKey {
        generate_key(self.to_params())
    }
}
