//! Storage layer for shelfscan.
//!
//! This module provides `SQLite`-based key-value slots. The record store keeps
//! its JSON snapshot in one slot; every write records a BLAKE3 digest of the
//! value so a damaged snapshot is detected on the next read.

pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::store::SnapshotBackend;

/// A stored slot value with its integrity metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Slot key.
    pub key: String,
    /// Stored document.
    pub value: String,
    /// BLAKE3 hex digest of `value` at write time.
    pub digest: String,
    /// When the slot was last written.
    pub saved_at: DateTime<Utc>,
}

impl Slot {
    /// Compute the BLAKE3 digest of a slot value.
    #[must_use]
    pub fn compute_digest(value: &str) -> String {
        blake3::hash(value.as_bytes()).to_hex().to_string()
    }

    /// True when the stored digest matches the stored value.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.digest == Self::compute_digest(&self.value)
    }
}

/// Key-value slot storage backed by `SQLite`.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
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
        schema::initialize(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
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
        schema::initialize(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, key: &str) -> Result<Option<Slot>> {
        let slot = self
            .conn
            .query_row(
                "SELECT key, value, digest, saved_at FROM slots WHERE key = ?1",
                [key],
                Self::row_to_slot,
            )
            .optional()?;
        Ok(slot)
    }

    /// Write a slot, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn put(&self, key: &str, value: &str) -> Result<Slot> {
        let slot = Slot {
            key: key.to_string(),
            value: value.to_string(),
            digest: Slot::compute_digest(value),
            saved_at: Utc::now(),
        };

        self.conn.execute(
            r"
            INSERT INTO slots (key, value, digest, saved_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                digest = excluded.digest,
                saved_at = excluded.saved_at
            ",
            params![slot.key, slot.value, slot.digest, slot.saved_at.to_rfc3339()],
        )?;

        debug!(key, bytes = value.len(), digest = &slot.digest[..16], "Wrote slot");
        Ok(slot)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let slot_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM slots", [], |row| row.get(0))?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            slot_count,
            db_size_bytes,
        })
    }

    fn row_to_slot(row: &rusqlite::Row) -> rusqlite::Result<Slot> {
        let saved_at_str: String = row.get(3)?;
        let saved_at = DateTime::parse_from_rfc3339(&saved_at_str).map_or_else(
            |_| {
                warn!("Unparseable slot timestamp: {}", saved_at_str);
                DateTime::<Utc>::UNIX_EPOCH
            },
            |dt| dt.with_timezone(&Utc),
        );

        Ok(Slot {
            key: row.get(0)?,
            value: row.get(1)?,
            digest: row.get(2)?,
            saved_at,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of slots stored.
    pub slot_count: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// The record snapshot kept in one slot of a [`Storage`].
#[derive(Debug)]
pub struct SqliteSnapshot {
    storage: Storage,
    key: String,
}

impl SqliteSnapshot {
    /// Use the slot `key` of `storage` as the snapshot.
    #[must_use]
    pub fn new(storage: Storage, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// The underlying storage.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The slot key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl SnapshotBackend for SqliteSnapshot {
    fn read(&mut self) -> Result<Option<String>> {
        match self.storage.get(&self.key)? {
            Some(slot) if !slot.is_intact() => Err(Error::SnapshotCorrupt {
                key: self.key.clone(),
            }),
            Some(slot) => Ok(Some(slot.value)),
            None => Ok(None),
        }
    }

    fn write(&mut self, snapshot: &str) -> Result<()> {
        self.storage.put(&self.key, snapshot).map(|_| ())
    }
}
