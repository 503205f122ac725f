//! CSV exchange format for records.
//!
//! Reading accepts the column spellings found in hand-maintained inventory
//! sheets (`upc`, `item name`, `aisle location`, `downstack pallet`, ...).
//! Writing always uses the record field names as the header.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::record::Record;

/// How strictly to treat malformed CSV input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Skip malformed rows with a warning. Used for the seed resource.
    Lenient,
    /// Any malformed row aborts the whole parse. Used for user imports.
    Strict,
}

/// Rows read from a CSV document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTable {
    /// Rows that carried a barcode, in file order.
    pub records: Vec<Record>,
    /// Rows dropped because they had no barcode or (lenient mode) were malformed.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Barcode,
    Name,
    Location,
    Pallet,
}

#[derive(Debug, Default)]
struct ColumnMap {
    barcode: Option<usize>,
    name: Option<usize>,
    location: Option<usize>,
    pallet: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut map = Self::default();
        for (index, header) in headers.iter().enumerate() {
            let slot = match classify_header(header) {
                Some(Column::Barcode) => &mut map.barcode,
                Some(Column::Name) => &mut map.name,
                Some(Column::Location) => &mut map.location,
                Some(Column::Pallet) => &mut map.pallet,
                None => continue,
            };
            // First matching column wins.
            if slot.is_none() {
                *slot = Some(index);
            }
        }
        map
    }

    fn record(&self, barcode: usize, row: &csv::StringRecord) -> Record {
        let field = |index: Option<usize>| {
            index
                .and_then(|i| row.get(i))
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };
        Record::new(
            field(Some(barcode)),
            field(self.name),
            field(self.location),
            field(self.pallet),
        )
    }
}

fn header_noise() -> &'static Regex {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    NOISE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex is valid"))
}

fn classify_header(header: &str) -> Option<Column> {
    let lower = header.to_lowercase();
    let normalized = header_noise().replace_all(&lower, "");
    match normalized.as_ref() {
        "barcode" | "upc" | "ean" | "code" => Some(Column::Barcode),
        "name" | "itemname" => Some(Column::Name),
        "location" | "aislelocation" | "aisle" => Some(Column::Location),
        "downstackpallet" | "downstack" | "pallet" => Some(Column::Pallet),
        _ => None,
    }
}

/// Parse CSV text into records.
///
/// The first row must be a header containing a barcode column. Text that is
/// empty or whitespace-only yields an empty table rather than an error.
///
/// # Errors
///
/// Returns [`Error::CsvMissingColumn`] when no header names a barcode column,
/// and (in [`ParseMode::Strict`]) [`Error::Csv`] for the first malformed row.
pub fn parse_records(text: &str, mode: ParseMode) -> Result<ParsedTable> {
    let text = text.trim_start_matches('\u{FEFF}');
    if text.trim().is_empty() {
        return Ok(ParsedTable::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(mode == ParseMode::Lenient)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let columns = ColumnMap::from_headers(&headers);
    let barcode = columns
        .barcode
        .ok_or(Error::CsvMissingColumn { column: "barcode" })?;
    debug!(headers = ?headers.iter().collect::<Vec<_>>(), "Parsing CSV");

    let mut table = ParsedTable::default();
    for result in reader.records() {
        let row = match result {
            Ok(row) => row,
            Err(e) if mode == ParseMode::Lenient => {
                warn!("Skipping malformed CSV row: {}", e);
                table.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let record = columns.record(barcode, &row);
        if record.barcode.is_empty() {
            table.skipped += 1;
            continue;
        }
        table.records.push(record);
    }

    debug!(
        rows = table.records.len(),
        skipped = table.skipped,
        "Parsed CSV"
    );
    Ok(table)
}

/// Serialize records to CSV text with a `barcode,name,location,downstackPallet` header.
///
/// # Errors
///
/// Returns an error if a record cannot be serialized.
pub fn write_records(records: &[Record]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| Error::internal(format!("CSV output not UTF-8: {e}")))
}
