//! Error types for shelfscan.
//!
//! This module defines all error types used throughout the shelfscan crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for shelfscan operations.
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

    /// The persisted snapshot does not match its stored digest.
    #[error("snapshot '{key}' is corrupt: stored digest does not match contents")]
    SnapshotCorrupt {
        /// Slot key of the snapshot.
        key: String,
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

    // === Record Errors ===
    /// A record with this barcode already exists.
    #[error("barcode {barcode} already exists in the record store")]
    DuplicateBarcode {
        /// The conflicting barcode.
        barcode: String,
    },

    /// A record is missing one or more required fields.
    #[error("please fill in all fields (missing: {})", .missing.join(", "))]
    IncompleteRecord {
        /// Names of the empty fields.
        missing: Vec<&'static str>,
    },

    // === CSV Errors ===
    /// CSV text could not be parsed or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The CSV header row lacks a required column.
    #[error("CSV header has no {column} column")]
    CsvMissingColumn {
        /// Name of the missing column.
        column: &'static str,
    },

    // === Decoder Errors ===
    /// The decoder failed to initialize.
    #[error("failed to initialize decoder '{name}': {message}")]
    DecoderInit {
        /// Name of the decoder.
        name: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    /// The scanning session stopped while input was still being routed.
    #[error("scanning session has stopped")]
    SessionClosed,

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

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
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for shelfscan operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a decoder initialization error.
    #[must_use]
    pub fn decoder_init(name: &'static str, message: impl Into<String>) -> Self {
        Self::DecoderInit {
            name,
            message: message.into(),
        }
    }

    /// Create a duplicate barcode error.
    #[must_use]
    pub fn duplicate(barcode: impl Into<String>) -> Self {
        Self::DuplicateBarcode {
            barcode: barcode.into(),
        }
    }

    /// Check if this error came from decoder start-up.
    #[must_use]
    pub fn is_decoder_error(&self) -> bool {
        matches!(self, Self::DecoderInit { .. })
    }

    /// Check if this error reports a barcode that is already stored.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateBarcode { .. })
    }

    /// Check if this error came from CSV parsing or header validation.
    #[must_use]
    pub fn is_csv_error(&self) -> bool {
        matches!(self, Self::Csv(_) | Self::CsvMissingColumn { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::internal("test error");
        assert_eq!(err.to_string(), "internal error: test error");

        let err = Error::duplicate("012345678905");
        assert_eq!(
            err.to_string(),
            "barcode 012345678905 already exists in the record store"
        );
    }

    #[test]
    fn test_error_is_duplicate() {
        assert!(Error::duplicate("1").is_duplicate());
        assert!(!Error::internal("x").is_duplicate());
    }

    #[test]
    fn test_incomplete_record_lists_fields() {
        let err = Error::IncompleteRecord {
            missing: vec!["location", "downstack pallet"],
        };
        let msg = err.to_string();
        assert!(msg.contains("please fill in all fields"));
        assert!(msg.contains("location, downstack pallet"));
    }

    #[test]
    fn test_decoder_init_error() {
        let err = Error::decoder_init("text-feed", "input closed");
        let msg = err.to_string();
        assert!(msg.contains("text-feed"));
        assert!(msg.contains("input closed"));
        assert!(err.is_decoder_error());
        assert!(!Error::internal("x").is_decoder_error());
    }

    #[test]
    fn test_csv_missing_column_is_csv_error() {
        let err = Error::CsvMissingColumn { column: "barcode" };
        assert!(err.is_csv_error());
        assert_eq!(err.to_string(), "CSV header has no barcode column");
        assert!(!Error::internal("x").is_csv_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
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
    fn test_snapshot_corrupt_display() {
        let err = Error::SnapshotCorrupt {
            key: "records".to_string(),
        };
        assert!(err.to_string().contains("records"));
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
