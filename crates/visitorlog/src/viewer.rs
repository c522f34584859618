//! Reading side of the visitor log.
//!
//! The [`Viewer`] loads every record once per session (server first, local
//! cache otherwise), keeps them newest first and answers search, summary,
//! export and clear requests against that list.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::record::{Record, UNAVAILABLE, UNKNOWN};
use crate::storage::{RecordStore, Source, StoreResolver};

/// Message shown when a server clear fails.
pub const CLEAR_FAILED_MESSAGE: &str = "Could not clear server file. Is the visitor server running?";

/// Why the record table is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyState {
    /// Nothing stored in the active source.
    NoRecords {
        /// Whether the active source is the server.
        server: bool,
    },
    /// Records exist but none match the query.
    NoMatches {
        /// The query as typed.
        query: String,
    },
}

impl fmt::Display for EmptyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRecords { server: true } => {
                f.write_str("No visitor records in the server file yet.")
            }
            Self::NoRecords { server: false } => f.write_str("No visitor records yet."),
            Self::NoMatches { query } => write!(f, "No records match \"{query}\"."),
        }
    }
}

/// Aggregate figures over the loaded records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Records loaded.
    pub total: usize,
    /// Distinct IPs, placeholders excluded.
    pub unique_ips: usize,
    /// Distinct non-empty fingerprints.
    pub unique_fingerprints: usize,
    /// `recordedAt` of the newest record.
    pub latest: Option<String>,
}

/// Session view over the visitor log.
#[derive(Debug)]
pub struct Viewer {
    resolver: StoreResolver,
    source: Source,
    records: Vec<Record>,
}

impl Viewer {
    /// Load all records through `resolver` and sort them newest first.
    pub async fn load(resolver: StoreResolver) -> Self {
        let resolved = resolver.resolve().await;
        let mut records = resolved.records;
        sort_newest_first(&mut records);
        info!(source = %resolved.source, count = records.len(), "Visitor log loaded");

        Self {
            resolver,
            source: resolved.source,
            records,
        }
    }

    /// Where the records came from.
    #[must_use]
    pub fn source(&self) -> &Source {
        &self.source
    }

    /// `Storage source: ...` label.
    #[must_use]
    pub fn source_label(&self) -> String {
        format!("Storage source: {}", self.source)
    }

    /// All loaded records, newest first.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Records matching `query`, case-insensitively, in display order.
    ///
    /// A blank query matches everything.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&Record> {
        let needle = query.trim().to_lowercase();
        self.records
            .iter()
            .filter(|record| matches_query(record, &needle))
            .collect()
    }

    /// The empty-state message for a search, or `None` when something matches.
    #[must_use]
    pub fn empty_state(&self, query: &str) -> Option<EmptyState> {
        if !self.search(query).is_empty() {
            return None;
        }
        if query.trim().is_empty() {
            Some(EmptyState::NoRecords {
                server: self.source.is_server(),
            })
        } else {
            Some(EmptyState::NoMatches {
                query: query.to_string(),
            })
        }
    }

    /// Counts over all loaded records.
    #[must_use]
    pub fn summary(&self) -> Summary {
        let unique_ips: HashSet<&str> = self
            .records
            .iter()
            .map(Record::ip)
            .filter(|ip| !ip.is_empty() && *ip != UNKNOWN && *ip != UNAVAILABLE)
            .collect();
        let unique_fingerprints: HashSet<&str> = self
            .records
            .iter()
            .map(Record::fingerprint)
            .filter(|fp| !fp.is_empty())
            .collect();

        Summary {
            total: self.records.len(),
            unique_ips: unique_ips.len(),
            unique_fingerprints: unique_fingerprints.len(),
            latest: self.records.first().map(|r| r.recorded_at().to_string()),
        }
    }

    /// Pretty JSON array of every loaded record, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    /// Write the export document into `dir`, named for `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn export_to(&self, dir: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|source| Error::DirectoryCreate {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(export_filename(now));
        std::fs::write(&path, self.export_json()?).map_err(|e| Error::file_io(&path, e))?;
        info!(path = %path.display(), count = self.records.len(), "Exported visitor log");
        Ok(path)
    }

    /// Confirmation question for [`Viewer::clear`].
    #[must_use]
    pub fn clear_prompt(&self) -> &'static str {
        if self.source.is_server() {
            "Delete all stored visitor records from the server file and local cache?"
        } else {
            "Delete all stored visitor records from this browser?"
        }
    }

    /// Delete every record.
    ///
    /// When the session reads from the server, the server is cleared first;
    /// if that fails nothing is changed locally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClearAborted`] if the server clear fails, or an I/O
    /// error if the local cache cannot be removed.
    pub async fn clear(&mut self) -> Result<()> {
        if self.source.is_server() {
            let remote = self
                .resolver
                .remote()
                .ok_or_else(|| Error::clear_aborted(CLEAR_FAILED_MESSAGE))?;
            if let Err(e) = remote.clear().await {
                warn!(url = remote.url(), error = %e, "Server clear failed");
                return Err(Error::clear_aborted(CLEAR_FAILED_MESSAGE));
            }
        }

        self.resolver.cache().remove()?;
        self.records.clear();
        info!(source = %self.source, "Visitor log cleared");
        Ok(())
    }
}

fn matches_query(record: &Record, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    record
        .searchable_fields()
        .join(" ")
        .to_lowercase()
        .contains(needle)
}

/// Sort newest first by `recordedAt`; missing or unparseable timestamps sort last.
pub fn sort_newest_first(records: &mut [Record]) {
    records.sort_by_key(|record| Reverse(record.recorded_time()));
}

/// `codex-visitor-log-<timestamp>.json` with `:` and `.` replaced by `-`.
#[must_use]
pub fn export_filename(now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("codex-visitor-log-{stamp}.json")
}

/// A field value for display; empty becomes `unknown`.
#[must_use]
pub fn display_text(value: &str) -> &str {
    if value.is_empty() {
        UNKNOWN
    } else {
        value
    }
}

/// A `recordedAt` value for display in local time.
///
/// Missing values read `unknown`; unparseable ones are shown verbatim.
#[must_use]
pub fn display_time(value: &str) -> String {
    if value.is_empty() {
        return UNKNOWN.to_string();
    }
    DateTime::parse_from_rfc3339(value).map_or_else(
        |_| value.to_string(),
        |time| {
            time.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        },
    )
}

/// Column headers of [`table_row`].
pub const TABLE_HEADERS: [&str; 16] = [
    "Recorded", "IP", "Location", "Coords", "Browser", "OS", "Device", "Language", "Timezone",
    "Viewport", "Screen", "Network", "Page", "Reason", "Referrer", "User agent",
];

/// Display cells of one record, in [`TABLE_HEADERS`] order.
#[must_use]
pub fn table_row(record: &Record) -> [String; 16] {
    [
        display_time(record.recorded_at()),
        display_text(record.ip()).to_string(),
        display_text(record.location()).to_string(),
        display_text(record.coords()).to_string(),
        display_text(record.browser()).to_string(),
        display_text(record.os()).to_string(),
        display_text(record.device()).to_string(),
        display_text(record.language()).to_string(),
        display_text(record.timezone()).to_string(),
        display_text(record.viewport()).to_string(),
        display_text(record.screen()).to_string(),
        display_text(record.network()).to_string(),
        display_text(record.page()).to_string(),
        display_text(record.reason()).to_string(),
        display_text(record.referrer()).to_string(),
        display_text(record.user_agent()).to_string(),
    ]
}
