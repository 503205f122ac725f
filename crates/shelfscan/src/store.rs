//! The record store.
//!
//! [`RecordStore`] owns the ordered list of records for a session and mirrors
//! it to a [`SnapshotBackend`] after every mutation. At most one record exists
//! per barcode at any time.

use std::path::Path;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::record::Record;
use crate::table::{self, ParseMode};

/// A persistent slot holding one serialized snapshot of the record list.
pub trait SnapshotBackend: std::fmt::Debug + Send {
    /// Read the stored snapshot, or `None` if nothing has been saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot exists but cannot be read or fails its
    /// integrity check.
    fn read(&mut self) -> Result<Option<String>>;

    /// Replace the stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    fn write(&mut self, snapshot: &str) -> Result<()>;
}

/// Snapshot backend that keeps the snapshot in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    value: Option<String>,
    writes: usize,
}

impl MemorySnapshot {
    /// Create a backend that already holds `snapshot`.
    #[must_use]
    pub fn with_snapshot(snapshot: impl Into<String>) -> Self {
        Self {
            value: Some(snapshot.into()),
            writes: 0,
        }
    }

    /// Number of writes performed so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl SnapshotBackend for MemorySnapshot {
    fn read(&mut self) -> Result<Option<String>> {
        Ok(self.value.clone())
    }

    fn write(&mut self, snapshot: &str) -> Result<()> {
        self.value = Some(snapshot.to_string());
        self.writes += 1;
        Ok(())
    }
}

/// Where the records of a freshly loaded store came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// The persisted snapshot.
    Snapshot,
    /// The seed CSV resource.
    Seed,
    /// Nothing was available (or loading failed).
    Empty,
}

/// Outcome of [`RecordStore::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Where the records came from.
    pub source: LoadSource,
    /// Number of records loaded.
    pub records: usize,
    /// User-visible warning, set when loading fell back to an empty store.
    pub warning: Option<String>,
}

/// Outcome of [`RecordStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new record was appended.
    Inserted,
    /// An existing record was updated in place.
    Updated,
}

/// Outcome of [`RecordStore::import_and_merge_csv`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Rows parsed from the CSV text that carried a barcode.
    pub parsed: usize,
    /// Records appended to the store.
    pub added: usize,
    /// Rows dropped because their barcode was already present.
    pub duplicates: usize,
    /// Rows dropped for lacking a barcode.
    pub skipped: usize,
}

/// What the latest mutation of the store was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// The store was (re)loaded.
    Loaded,
    /// A record was appended.
    Inserted(String),
    /// A record was updated in place.
    Updated(String),
    /// A CSV import appended this many records.
    Imported(usize),
}

/// Change notification published after every mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRevision {
    /// Monotonic revision counter.
    pub revision: u64,
    /// Number of records after the change.
    pub len: usize,
    /// The change that produced this revision.
    pub change: StoreChange,
}

/// In-memory ordered record list mirrored to a snapshot slot.
#[derive(Debug)]
pub struct RecordStore {
    records: Vec<Record>,
    backend: Box<dyn SnapshotBackend>,
    changes: watch::Sender<StoreRevision>,
}

impl RecordStore {
    /// Create an empty store over `backend` without reading it.
    #[must_use]
    pub fn empty(backend: Box<dyn SnapshotBackend>) -> Self {
        let (changes, _) = watch::channel(StoreRevision {
            revision: 0,
            len: 0,
            change: StoreChange::Loaded,
        });
        Self {
            records: Vec::new(),
            backend,
            changes,
        }
    }

    /// Load the store.
    ///
    /// Reads the persisted snapshot; if there is none, parses the seed CSV at
    /// `seed` (when given), drops rows without a barcode, and persists the
    /// result. A missing seed file is treated as "no data".
    ///
    /// Never fails: any read or parse error yields an empty store and a
    /// warning in the returned [`LoadReport`].
    #[must_use]
    pub fn load(backend: Box<dyn SnapshotBackend>, seed: Option<&Path>) -> (Self, LoadReport) {
        let mut store = Self::empty(backend);
        let report = match store.try_load(seed) {
            Ok(report) => report,
            Err(e) => {
                warn!("Error loading records: {e}");
                store.records.clear();
                LoadReport {
                    source: LoadSource::Empty,
                    records: 0,
                    warning: Some(format!("Error loading records: {e}")),
                }
            }
        };
        store.publish(StoreChange::Loaded);
        (store, report)
    }

    fn try_load(&mut self, seed: Option<&Path>) -> Result<LoadReport> {
        if let Some(snapshot) = self.backend.read()? {
            let records: Vec<Record> = serde_json::from_str(&snapshot)?;
            self.records = unique_by_barcode(records);
            info!("Loaded {} records from snapshot", self.records.len());
            return Ok(self.report(LoadSource::Snapshot, None));
        }

        let Some(path) = seed else {
            debug!("No snapshot and no seed resource configured");
            return Ok(self.report(LoadSource::Empty, None));
        };

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "Seed file {} not found. Initializing with empty data.",
                    path.display()
                );
                return Ok(self.report(LoadSource::Empty, None));
            }
            Err(e) => return Err(e.into()),
        };

        let source = if text.trim().is_empty() {
            warn!("Seed file {} is empty. Initializing with empty data.", path.display());
            LoadSource::Empty
        } else {
            let parsed = table::parse_records(&text, ParseMode::Lenient)?;
            self.records = unique_by_barcode(parsed.records);
            info!(
                "Loaded {} records from seed {}",
                self.records.len(),
                path.display()
            );
            LoadSource::Seed
        };

        let warning = self.persist().err().map(|e| {
            warn!("Failed to persist seeded records: {e}");
            format!("Records loaded but not saved: {e}")
        });
        Ok(self.report(source, warning))
    }

    fn report(&self, source: LoadSource, warning: Option<String>) -> LoadReport {
        LoadReport {
            source,
            records: self.records.len(),
            warning,
        }
    }

    /// All records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StoreRevision> {
        self.changes.subscribe()
    }

    /// The latest published revision.
    #[must_use]
    pub fn revision(&self) -> StoreRevision {
        self.changes.borrow().clone()
    }

    /// Find the record for `code`.
    #[must_use]
    pub fn find_by_barcode(&self, code: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.barcode == code)
    }

    /// Insert `record`, or overwrite the metadata of the record with the same
    /// barcode. The full snapshot is persisted afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteRecord`] if the barcode is empty. A persist
    /// failure is returned after the in-memory list has already changed.
    pub fn upsert(&mut self, record: Record) -> Result<UpsertOutcome> {
        if record.barcode.is_empty() {
            return Err(Error::IncompleteRecord {
                missing: vec!["barcode"],
            });
        }

        let outcome = if let Some(existing) =
            self.records.iter_mut().find(|r| r.barcode == record.barcode)
        {
            existing.update_from(&record);
            debug!("Updated existing record: {:?}", existing);
            self.publish(StoreChange::Updated(record.barcode.clone()));
            UpsertOutcome::Updated
        } else {
            debug!("Added new record: {:?}", record);
            let barcode = record.barcode.clone();
            self.records.push(record);
            self.publish(StoreChange::Inserted(barcode));
            UpsertOutcome::Inserted
        };

        self.persist()?;
        Ok(outcome)
    }

    /// Add a complete record whose barcode is not stored yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteRecord`] if any field is empty and
    /// [`Error::DuplicateBarcode`] if the barcode is already stored; the store
    /// is unchanged in both cases.
    pub fn insert_new(&mut self, record: Record) -> Result<()> {
        let mut missing = Vec::new();
        if record.barcode.is_empty() {
            missing.push("barcode");
        }
        missing.extend(record.missing_fields());
        if !missing.is_empty() {
            return Err(Error::IncompleteRecord { missing });
        }
        if self.find_by_barcode(&record.barcode).is_some() {
            return Err(Error::duplicate(record.barcode));
        }
        self.upsert(record).map(|_| ())
    }

    /// Serialize every record to CSV text.
    ///
    /// Returns `Ok(None)` when the store is empty, so callers can report
    /// "no data" instead of producing an empty file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_csv(&self) -> Result<Option<String>> {
        if self.records.is_empty() {
            return Ok(None);
        }
        table::write_records(&self.records).map(Some)
    }

    /// Write the CSV export to `path`, returning the number of records written.
    ///
    /// Returns `Ok(None)` without touching the file system when the store is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    pub fn export_to_file(&self, path: &Path) -> Result<Option<usize>> {
        let Some(text) = self.export_csv()? else {
            return Ok(None);
        };
        std::fs::write(path, text)?;
        info!("Exported {} records to {}", self.records.len(), path.display());
        Ok(Some(self.records.len()))
    }

    /// Merge records parsed from CSV `text` into the store.
    ///
    /// Rows whose barcode is already present (including earlier rows of the
    /// same import) are dropped; existing records are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns a CSV error if the text is malformed or has no barcode column;
    /// nothing is merged in that case.
    pub fn import_and_merge_csv(&mut self, text: &str) -> Result<ImportSummary> {
        let parsed = table::parse_records(text, ParseMode::Strict)?;
        let mut summary = ImportSummary {
            parsed: parsed.records.len(),
            skipped: parsed.skipped,
            ..ImportSummary::default()
        };

        for record in parsed.records {
            if self.find_by_barcode(&record.barcode).is_some() {
                summary.duplicates += 1;
            } else {
                self.records.push(record);
                summary.added += 1;
            }
        }

        info!(
            added = summary.added,
            duplicates = summary.duplicates,
            "Merged CSV import"
        );
        if summary.added > 0 {
            self.publish(StoreChange::Imported(summary.added));
            self.persist()?;
        }
        Ok(summary)
    }

    fn persist(&mut self) -> Result<()> {
        let snapshot = serde_json::to_string(&self.records)?;
        self.backend.write(&snapshot)
    }

    fn publish(&self, change: StoreChange) {
        let revision = self.changes.borrow().revision + 1;
        self.changes.send_replace(StoreRevision {
            revision,
            len: self.records.len(),
            change,
        });
    }
}

/// Keep the first record for each barcode and drop records without one.
fn unique_by_barcode(records: Vec<Record>) -> Vec<Record> {
    let mut unique: Vec<Record> = Vec::with_capacity(records.len());
    for record in records {
        if record.barcode.is_empty() || unique.iter().any(|r| r.barcode == record.barcode) {
            continue;
        }
        unique.push(record);
    }
    unique
}
