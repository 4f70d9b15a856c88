//! Key/value store abstraction with TTL expiry
//!
//! The performance service only talks to `Store`. Expiry is the store's job:
//! an expired entry must read back as absent, and `None` is the only absent
//! sentinel, so an empty row list or a cached error is always a hit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::CachedPayload;

/// Errors that can occur when reading or writing the cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem access failed
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// An entry could not be encoded or decoded
    #[error("Cache entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The TTL does not fit in a timestamp
    #[error("Invalid TTL: {0:?}")]
    InvalidTtl(Duration),

    /// A lock guarding the store was poisoned
    #[error("Cache lock poisoned")]
    Poisoned,
}

/// Source of the current time, injectable so expiry can be tested
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        if let (Ok(mut now), Ok(step)) = (self.now.lock(), chrono::Duration::from_std(by)) {
            *now += step;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}

/// A stored value together with its timestamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CacheEntry {
    /// The cached data
    pub(crate) data: CachedPayload,
    /// When the data was cached
    pub(crate) cached_at: DateTime<Utc>,
    /// When the cache entry expires
    pub(crate) expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub(crate) fn new(
        data: CachedPayload,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, CacheError> {
        let step = chrono::Duration::from_std(ttl).map_err(|_| CacheError::InvalidTtl(ttl))?;
        let expires_at = now
            .checked_add_signed(step)
            .ok_or(CacheError::InvalidTtl(ttl))?;
        Ok(Self {
            data,
            cached_at: now,
            expires_at,
        })
    }

    pub(crate) fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Key/value storage with per-entry TTL
pub trait Store: Send + Sync {
    /// Returns the live value for `key`, or `None` if absent or expired
    fn get(&self, key: &str) -> Result<Option<CachedPayload>, CacheError>;

    /// Replaces the value for `key`, live for `ttl` from now
    fn set(&self, key: &str, value: &CachedPayload, ttl: Duration) -> Result<(), CacheError>;

    /// Removes `key`; returns whether anything was removed
    fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Removes every entry owned by this store; returns how many were removed
    fn clear_all(&self) -> Result<usize, CacheError>;

    /// Number of entries currently held, expired or not
    fn count(&self) -> Result<usize, CacheError>;

    /// Expiry time of the entry at `key`, if one is live
    fn expires_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, CacheError>;
}

/// Process-local store backed by a `HashMap`
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn live_entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let now = self.clock.now();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<CachedPayload>, CacheError> {
        Ok(self.live_entry(key)?.map(|entry| entry.data))
    }

    fn set(&self, key: &str, value: &CachedPayload, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry::new(value.clone(), self.clock.now(), ttl)?;
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn clear_all(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    fn count(&self) -> Result<usize, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.len())
    }

    fn expires_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, CacheError> {
        Ok(self.live_entry(key)?.map(|entry| entry.expires_at))
    }
}
