//! Storage layer for visitorlog.
//!
//! The visitor log is an append-only list capped at a fixed number of
//! records, oldest evicted first. It has three realizations:
//!
//! - [`Storage`]: the server-side `SQLite` file behind the HTTP API
//! - [`RemoteStore`]: a client of that API
//! - [`LocalCache`]: the private per-client fallback, one JSON file per key
//!
//! [`RemoteStore`] and [`LocalCache`] implement [`RecordStore`];
//! [`StoreResolver`] picks between them for a session.

mod cache;
pub mod migrations;
mod remote;
mod resolver;
pub mod schema;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_MAX_RECORDS;
use crate::error::{Error, Result};
use crate::record::Record;

pub use cache::LocalCache;
pub use remote::RemoteStore;
pub use resolver::{Resolved, StoreResolver};

/// Which backend a result came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// The shared server-side log, reached through the API at `url`.
    ServerFile {
        /// API URL.
        url: String,
    },
    /// The private local fallback.
    BrowserCache,
}

impl Source {
    /// Whether this is the shared server log.
    #[must_use]
    pub fn is_server(&self) -> bool {
        matches!(self, Self::ServerFile { .. })
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerFile { url } => write!(f, "server file via {url}"),
            Self::BrowserCache => f.write_str("browser cache (API unavailable)"),
        }
    }
}

/// The append-capped record list contract.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Which backend this store is.
    fn source(&self) -> Source;

    /// Up to `limit` records, most recent first. Empty stores return `[]`.
    async fn list(&self, limit: usize) -> Result<Vec<Record>>;

    /// Append one record, evicting the oldest beyond the cap.
    async fn append(&self, record: &Record) -> Result<()>;

    /// Delete every record.
    async fn clear(&self) -> Result<()>;
}

/// Drop the oldest entries of an oldest-first list so at most `cap` remain.
///
/// Returns the number of evicted records.
pub fn evict_oldest(records: &mut Vec<Record>, cap: usize) -> usize {
    let excess = records.len().saturating_sub(cap);
    if excess > 0 {
        records.drain(..excess);
    }
    excess
}

fn str_field<'a>(record: &'a Value, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Server-side visitor log backed by `SQLite`.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
    /// Cap on retained records.
    max_records: usize,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn,
            max_records: DEFAULT_MAX_RECORDS,
        })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
            max_records: DEFAULT_MAX_RECORDS,
        })
    }

    /// Set the record cap. Values below 1 are treated as 1.
    #[must_use]
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records.max(1);
        self
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The record cap.
    #[must_use]
    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Append a posted record verbatim, then evict beyond the cap.
    ///
    /// `id`, `recordedAt` and `fingerprint` are copied into their columns
    /// when present as strings; the stored body is the value unchanged.
    /// Returns the insertion sequence number, or `None` when a record with
    /// the same non-empty id is already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert(&self, record: &Value) -> Result<Option<i64>> {
        let record_id = str_field(record, "id");
        if !record_id.is_empty() && self.exists_by_id(record_id)? {
            debug!("Skipping duplicate record {}", record_id);
            return Ok(None);
        }

        let body = serde_json::to_string(record)?;
        self.conn.execute(
            r"
            INSERT INTO visitors (record_id, recorded_at, fingerprint, body)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                record_id,
                str_field(record, "recordedAt"),
                str_field(record, "fingerprint"),
                body
            ],
        )?;

        let seq = self.conn.last_insert_rowid();
        debug!("Inserted record {} at seq {}", record_id, seq);

        self.prune_keep_recent(self.max_records)?;
        Ok(Some(seq))
    }

    fn exists_by_id(&self, record_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM visitors WHERE record_id = ?1",
            [record_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Up to `limit` stored records as posted, most recently appended first.
    ///
    /// Rows whose body no longer parses are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<Value>> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, body FROM visitors ORDER BY seq DESC LIMIT ?1")?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map([limit_i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(seq, body)| match serde_json::from_str(&body) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(seq, error = %e, "Skipping unreadable visitor row");
                    None
                }
            })
            .collect())
    }

    /// Count stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM visitors", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Delete every record. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear(&self) -> Result<usize> {
        let affected = self.conn.execute("DELETE FROM visitors", [])?;
        info!("Cleared {} visitor records", affected);
        Ok(affected)
    }

    /// Keep only the `keep_count` most recently appended records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_keep_recent(&self, keep_count: usize) -> Result<usize> {
        let keep_i64 = i64::try_from(keep_count).unwrap_or(i64::MAX);
        let affected = self.conn.execute(
            r"
            DELETE FROM visitors WHERE seq NOT IN (
                SELECT seq FROM visitors ORDER BY seq DESC LIMIT ?1
            )
            ",
            [keep_i64],
        )?;

        if affected > 0 {
            debug!("Evicted {} records to keep {}", affected, keep_count);
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::record::fixtures::record_at;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn posted(offset_secs: i64, ip: &str) -> Value {
        serde_json::to_value(record_at(offset_secs, ip)).unwrap()
    }

    fn ips(values: &[Value]) -> Vec<&str> {
        values.iter().map(|v| str_field(v, "ip")).collect()
    }

    #[test]
    fn test_source_labels() {
        let server = Source::ServerFile {
            url: "/codex/api/visitors".to_string(),
        };
        assert_eq!(server.to_string(), "server file via /codex/api/visitors");
        assert!(server.is_server());
        assert_eq!(
            Source::BrowserCache.to_string(),
            "browser cache (API unavailable)"
        );
        assert!(!Source::BrowserCache.is_server());
    }

    #[test]
    fn test_evict_oldest_keeps_newest() {
        let mut records: Vec<Record> = (0..7).map(|i| record_at(i, &format!("10.0.0.{i}"))).collect();
        let evicted = evict_oldest(&mut records, 4);

        assert_eq!(evicted, 3);
        let ips: Vec<&str> = records.iter().map(Record::ip).collect();
        assert_eq!(ips, ["10.0.0.3", "10.0.0.4", "10.0.0.5", "10.0.0.6"]);
    }

    #[test]
    fn test_evict_oldest_under_cap() {
        let mut records = vec![record_at(0, "10.0.0.1")];
        assert_eq!(evict_oldest(&mut records, 4), 0);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_empty_store_lists_nothing() {
        let storage = create_test_storage();
        assert!(storage.list_recent(10).unwrap().is_empty());
        assert_eq!(storage.count().unwrap(), 0);
    }

    #[test]
    fn test_insert_and_list_most_recent_first() {
        let storage = create_test_storage();
        for i in 0..3 {
            storage.insert(&posted(i, &format!("10.0.0.{i}"))).unwrap();
        }

        let listed = storage.list_recent(10).unwrap();
        assert_eq!(ips(&listed), ["10.0.0.2", "10.0.0.1", "10.0.0.0"]);

        let limited = storage.list_recent(2).unwrap();
        assert_eq!(ips(&limited), ["10.0.0.2", "10.0.0.1"]);
    }

    #[test]
    fn test_insert_duplicate_id_ignored() {
        let storage = create_test_storage();
        let record = posted(0, "10.0.0.1");

        assert!(storage.insert(&record).unwrap().is_some());
        assert!(storage.insert(&record).unwrap().is_none());
        assert_eq!(storage.count().unwrap(), 1);
    }

    #[test]
    fn test_cap_evicts_oldest_by_insertion() {
        let storage = create_test_storage().with_max_records(5);
        let records: Vec<Value> = (0..12).map(|i| posted(i, &format!("10.0.0.{i}"))).collect();
        for record in &records {
            storage.insert(record).unwrap();
        }

        assert_eq!(storage.count().unwrap(), 5);
        let mut kept = storage.list_recent(100).unwrap();
        kept.reverse();
        assert_eq!(kept, records[7..].to_vec());
    }

    #[test]
    fn test_eviction_ignores_recorded_at() {
        let storage = create_test_storage().with_max_records(2);
        storage.insert(&posted(100, "newest-time")).unwrap();
        storage.insert(&posted(0, "older-time")).unwrap();
        storage.insert(&posted(50, "middle-time")).unwrap();

        let listed = storage.list_recent(10).unwrap();
        assert_eq!(ips(&listed), ["middle-time", "older-time"]);
    }

    #[test]
    fn test_records_stored_verbatim() {
        let storage = create_test_storage();
        let record = json!({
            "id": "42-abcdef",
            "recordedAt": "2025-01-01T00:00:00.000Z",
            "ip": "192.0.2.7",
            "clientHint": ["a", "b"]
        });
        storage.insert(&record).unwrap();

        let listed = storage.list_recent(1).unwrap();
        assert_eq!(listed, vec![record]);
    }

    #[test]
    fn test_partial_and_oddly_typed_records_kept_as_posted() {
        let storage = create_test_storage();
        let partial = json!({"id": "1-abcdef", "recordedAt": "2025-01-01T00:00:00.000Z", "ip": "192.0.2.1"});
        let odd = json!({"id": 7, "ip": null, "coords": {"lat": 1}});
        storage.insert(&partial).unwrap();
        storage.insert(&odd).unwrap();

        let listed = storage.list_recent(10).unwrap();
        assert_eq!(listed, vec![odd, partial]);
    }

    #[test]
    fn test_records_without_string_id_never_collide() {
        let storage = create_test_storage();
        storage.insert(&json!({"ip": "10.0.0.1"})).unwrap();
        storage.insert(&json!({"ip": "10.0.0.1"})).unwrap();
        assert_eq!(storage.count().unwrap(), 2);
    }

    #[test]
    fn test_corrupt_row_skipped() {
        let storage = create_test_storage();
        storage.insert(&posted(0, "10.0.0.1")).unwrap();
        storage
            .conn
            .execute(
                "INSERT INTO visitors (record_id, recorded_at, fingerprint, body) VALUES ('x', '', '', '{broken')",
                [],
            )
            .unwrap();

        let listed = storage.list_recent(10).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_clear() {
        let storage = create_test_storage();
        storage.insert(&posted(0, "10.0.0.1")).unwrap();
        storage.insert(&posted(1, "10.0.0.2")).unwrap();

        assert_eq!(storage.clear().unwrap(), 2);
        assert!(storage.list_recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_with_max_records_floor() {
        let storage = create_test_storage().with_max_records(0);
        assert_eq!(storage.max_records(), 1);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested/deeper/visitors.db");

        let storage = Storage::open(&nested).unwrap();
        storage.insert(&posted(0, "10.0.0.1")).unwrap();

        assert!(nested.exists());
        assert_eq!(storage.path(), nested);
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visitors.db");

        {
            let storage = Storage::open(&path).unwrap();
            storage.insert(&posted(0, "10.0.0.1")).unwrap();
        }

        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.count().unwrap(), 1);
    }
}
