//! Cache manager for persisting query results to disk
//!
//! Provides a `CacheManager` that stores cached payloads as JSON files with
//! expiry timestamps. Expired or unreadable entries read back as absent and
//! are left for the next write to replace. Writes go to a temporary file that
//! is renamed over the target, so readers only ever see whole entries.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use tempfile::NamedTempFile;

use super::store::{CacheEntry, CacheError, Clock, Store, SystemClock};
use crate::data::CachedPayload;

/// Prefix for every file this manager owns, so `clear_all` never touches foreign files
pub const CACHE_PREFIX: &str = "gscd_cache_";

/// Manages reading and writing cached data to disk
///
/// The cache manager stores data as JSON files in an XDG-compliant cache directory
/// (`~/.cache/gscdata/` on Linux). Each file holds one entry with its expiry
/// timestamp; the manager treats anything past that timestamp as absent.
#[derive(Clone)]
pub struct CacheManager {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

impl CacheManager {
    /// Creates a new CacheManager using XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "gscdata")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a new CacheManager with a custom cache directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for expiry decisions
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path to a cache file for the given key
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}{}.json", CACHE_PREFIX, key))
    }

    /// Ensures the cache directory exists
    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.cache_dir)
    }

    /// Paths of every file this manager owns
    fn owned_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let dir = match fs::read_dir(&self.cache_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in dir {
            let path = entry?.path();
            let owned = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(CACHE_PREFIX) && name.ends_with(".json"));
            if owned {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Reads the entry at `key` if it is still live
    ///
    /// A file that no longer parses is treated like an expired one. Neither is
    /// deleted here: another process may have just replaced it.
    fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.cache_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(key, error = %e, "Ignoring unreadable cache file");
                return Ok(None);
            }
        };

        if entry.is_expired(self.clock.now()) {
            return Ok(None);
        }
        Ok(Some(entry))
    }
}

impl Store for CacheManager {
    fn get(&self, key: &str) -> Result<Option<CachedPayload>, CacheError> {
        Ok(self.read_entry(key)?.map(|entry| entry.data))
    }

    /// Writes the payload to `<cache_dir>/gscd_cache_<key>.json`, creating the directory
    ///
    /// The entry is written to a temporary file in the same directory and
    /// renamed into place.
    fn set(&self, key: &str, value: &CachedPayload, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_dir()?;

        let entry = CacheEntry::new(value.clone(), self.clock.now(), ttl)?;
        let mut file = NamedTempFile::new_in(&self.cache_dir)?;
        serde_json::to_writer_pretty(&mut file, &entry)?;
        file.persist(self.cache_path(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match fs::remove_file(self.cache_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_all(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.owned_files()? {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    fn count(&self) -> Result<usize, CacheError> {
        Ok(self.owned_files()?.len())
    }

    fn expires_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, CacheError> {
        Ok(self.read_entry(key)?.map(|entry| entry.expires_at))
    }
}
