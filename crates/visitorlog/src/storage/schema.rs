//! `SQLite` schema for the server-side visitor log.
//!
//! Records are kept verbatim as JSON in `body`; the other columns are copies
//! of fields used for ordering and duplicate detection.

/// SQL statement to create the visitors table.
///
/// `seq` is the insertion order and the eviction order.
pub const CREATE_VISITORS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS visitors (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    body TEXT NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// Index on `record_id` for duplicate detection.
pub const CREATE_RECORD_ID_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_visitors_record_id ON visitors(record_id)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_VISITORS_TABLE,
    CREATE_RECORD_ID_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visitors_table_columns() {
        assert!(CREATE_VISITORS_TABLE.contains("seq INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(CREATE_VISITORS_TABLE.contains("record_id TEXT NOT NULL"));
        assert!(CREATE_VISITORS_TABLE.contains("body TEXT NOT NULL"));
    }

    #[test]
    fn test_statements_ordered_table_first() {
        assert_eq!(SCHEMA_STATEMENTS[0], CREATE_VISITORS_TABLE);
        assert!(SCHEMA_STATEMENTS.contains(&CREATE_METADATA_TABLE));
    }
}
