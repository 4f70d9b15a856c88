//! Cache module for storing query results with TTL expiry
//!
//! This module provides deterministic cache keys for query parameters, the
//! `Store` abstraction the performance service reads and writes through, and
//! two stores: an on-disk `CacheManager` and an in-process `MemoryStore`.

pub mod key;
mod manager;
mod store;

pub use key::{generate_key, CacheKey, ParamValue, QueryParams, PERFORMANCE_DATA_ACTION};
pub use manager::{CacheManager, CACHE_PREFIX};
pub use store::{CacheError, Clock, ManualClock, MemoryStore, Store, SystemClock};
