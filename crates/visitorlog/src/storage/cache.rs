//! Local fallback cache.
//!
//! One JSON file per storage key, holding the oldest-first array of records.
//! A missing or unreadable file reads as an empty log.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::Record;

use super::{evict_oldest, RecordStore, Source};

/// Private per-client copy of the visitor log.
#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
    key: String,
    max_records: usize,
}

impl LocalCache {
    /// Cache stored under `dir` with the given key and cap.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, key: impl Into<String>, max_records: usize) -> Self {
        Self {
            dir: dir.into(),
            key: key.into(),
            max_records: max_records.max(1),
        }
    }

    /// Cache configured by `[storage]`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.cache_dir(),
            config.storage.cache_key.clone(),
            config.storage.max_records,
        )
    }

    /// The file backing this cache.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.key))
    }

    /// The storage key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// All cached records, oldest first.
    #[must_use]
    pub fn read(&self) -> Vec<Record> {
        let path = self.path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Local cache unreadable, treating as empty");
                return Vec::new();
            }
        };

        if raw.trim().is_empty() {
            return Vec::new();
        }

        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Local cache corrupt, treating as empty");
                Vec::new()
            }
        }
    }

    /// Replace the cache with `records` (oldest first), keeping the newest `cap`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn write(&self, records: &[Record]) -> Result<()> {
        let start = records.len().saturating_sub(self.max_records);
        let json = serde_json::to_string(&records[start..])?;
        self.write_raw(&json)
    }

    /// Append one record and evict beyond the cap.
    ///
    /// A record whose id is already cached is not added again. Returns the
    /// number of records held afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    pub fn push(&self, record: &Record) -> Result<usize> {
        let mut records = self.read();
        if !record.id().is_empty() && records.iter().any(|r| r.id() == record.id()) {
            debug!("Record {} already cached", record.id());
            return Ok(records.len());
        }

        records.push(record.clone());
        let evicted = evict_oldest(&mut records, self.max_records);
        if evicted > 0 {
            debug!(evicted, "Evicted oldest cached records");
        }

        let json = serde_json::to_string(&records)?;
        self.write_raw(&json)?;
        Ok(records.len())
    }

    /// Remove the cache entry entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self) -> Result<()> {
        let path = self.path();
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::file_io(path, e)),
        }
    }

    fn write_raw(&self, json: &str) -> Result<()> {
        ensure_dir(&self.dir)?;
        let path = self.path();
        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, json).map_err(|e| Error::file_io(&temp, e))?;
        std::fs::rename(&temp, &path).map_err(|e| Error::file_io(&path, e))?;
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|source| Error::DirectoryCreate {
        path: dir.to_path_buf(),
        source,
    })
}

#[async_trait]
impl RecordStore for LocalCache {
    fn source(&self) -> Source {
        Source::BrowserCache
    }

    async fn list(&self, limit: usize) -> Result<Vec<Record>> {
        Ok(self.read().into_iter().rev().take(limit).collect())
    }

    async fn append(&self, record: &Record) -> Result<()> {
        self.push(record).map(|_| ())
    }

    async fn clear(&self) -> Result<()> {
        self.remove()
    }
}
