//! Error types for visitorlog.
//!
//! This module defines all error types used throughout the visitorlog crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for visitorlog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Remote API Errors ===
    /// The HTTP transport failed (connection refused, DNS, timeout, bad body).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The visitor API answered with a non-success status.
    #[error("visitor API at {url} returned HTTP {status}")]
    ApiStatus {
        /// The requested URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// No remote backend can be used in this session.
    #[error("remote visitor API unavailable: {reason}")]
    RemoteUnavailable {
        /// Why the remote cannot be used.
        reason: String,
    },

    /// A destructive clear could not be completed and nothing was changed locally.
    #[error("clear aborted: {message}")]
    ClearAborted {
        /// Description of the failure that aborted the clear.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file operation failed on a known path.
    #[error("I/O error at {path}: {source}")]
    FileIo {
        /// Path of the file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },
}

/// A specialized Result type for visitorlog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a non-success status error for the given URL.
    #[must_use]
    pub fn api_status(url: impl Into<String>, status: u16) -> Self {
        Self::ApiStatus {
            url: url.into(),
            status,
        }
    }

    /// Create a remote-unavailable error.
    #[must_use]
    pub fn remote_unavailable(reason: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a clear-aborted error.
    #[must_use]
    pub fn clear_aborted(message: impl Into<String>) -> Self {
        Self::ClearAborted {
            message: message.into(),
        }
    }

    /// Create a file I/O error with path context.
    #[must_use]
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }

    /// Check if this error means the remote backend could not be reached or used.
    ///
    /// These are the errors that make a caller fall back to the local cache.
    #[must_use]
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::ApiStatus { .. } | Self::RemoteUnavailable { .. }
        )
    }

    /// Check if this error is an aborted clear.
    #[must_use]
    pub fn is_clear_aborted(&self) -> bool {
        matches!(self, Self::ClearAborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::remote_unavailable("no base url configured");
        assert_eq!(
            err.to_string(),
            "remote visitor API unavailable: no base url configured"
        );

        let err = Error::Timeout {
            operation: "GET https://api.ipify.org".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation timed out: GET https://api.ipify.org"
        );
    }

    #[test]
    fn test_api_status_display() {
        let err = Error::api_status("http://127.0.0.1:8080/api/visitors", 503);
        let msg = err.to_string();
        assert!(msg.contains("/api/visitors"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn test_is_remote_failure() {
        assert!(Error::api_status("u", 500).is_remote_failure());
        assert!(Error::remote_unavailable("x").is_remote_failure());
        assert!(!Error::file_io("cache.json", std::io::Error::other("x")).is_remote_failure());
        assert!(!Error::clear_aborted("x").is_remote_failure());
    }

    #[test]
    fn test_is_clear_aborted() {
        let err = Error::clear_aborted("server clear failed");
        assert!(err.is_clear_aborted());
        assert!(err.to_string().contains("server clear failed"));
        assert!(!Error::remote_unavailable("x").is_clear_aborted());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_file_io_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::file_io("/tmp/cache.json", io_err);
        assert!(err.to_string().contains("/tmp/cache.json"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_database_migration_error_display() {
        let err = Error::DatabaseMigration {
            message: "version mismatch".to_string(),
        };
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "max_records must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("max_records"));
    }

    #[test]
    fn test_timeout_error_display() {
        let err = Error::Timeout {
            operation: "ip lookup".to_string(),
        };
        assert!(err.to_string().contains("ip lookup"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
