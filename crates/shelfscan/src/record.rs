//! Product/location records.
//!
//! A [`Record`] ties a barcode to the item name, aisle location and downstack
//! pallet a user entered for it. Barcode is the only key; the other three
//! fields are free text.

use serde::{Deserialize, Serialize};

/// Human-readable names of the metadata fields, in form order.
pub const NAME_FIELD: &str = "item name";
/// See [`NAME_FIELD`].
pub const LOCATION_FIELD: &str = "aisle location";
/// See [`NAME_FIELD`].
pub const PALLET_FIELD: &str = "downstack pallet";

/// A single product record keyed by barcode.
///
/// Serializes with the field names `barcode`, `name`, `location` and
/// `downstackPallet`, both in the JSON snapshot and in exported CSV.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Decoded barcode symbol. Unique within a store.
    pub barcode: String,
    /// Item name.
    #[serde(default)]
    pub name: String,
    /// Aisle location.
    #[serde(default)]
    pub location: String,
    /// Downstack pallet identifier.
    #[serde(default)]
    pub downstack_pallet: String,
}

impl Record {
    /// Create a record, trimming surrounding whitespace from every field.
    #[must_use]
    pub fn new(
        barcode: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
        downstack_pallet: impl Into<String>,
    ) -> Self {
        Self {
            barcode: trimmed(barcode.into()),
            name: trimmed(name.into()),
            location: trimmed(location.into()),
            downstack_pallet: trimmed(downstack_pallet.into()),
        }
    }

    /// Create a record that has a barcode and nothing else.
    #[must_use]
    pub fn bare(barcode: impl Into<String>) -> Self {
        Self::new(barcode, "", "", "")
    }

    /// Names of the metadata fields that are empty, in form order.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push(NAME_FIELD);
        }
        if self.location.trim().is_empty() {
            missing.push(LOCATION_FIELD);
        }
        if self.downstack_pallet.trim().is_empty() {
            missing.push(PALLET_FIELD);
        }
        missing
    }

    /// True when name, location and pallet are all non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Copy the metadata fields of `other` into this record, keeping the barcode.
    pub fn update_from(&mut self, other: &Record) {
        self.name.clone_from(&other.name);
        self.location.clone_from(&other.location);
        self.downstack_pallet.clone_from(&other.downstack_pallet);
    }

    /// One-line summary shown when a complete record is scanned.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Item: {} | Aisle: {} | Pallet: {}",
            self.name, self.location, self.downstack_pallet
        )
    }
}

fn trimmed(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.len() == value.len() {
        value
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_fields() {
        let record = Record::new(" 111 ", " Widget", "Aisle 3 ", "\tP12\n");
        assert_eq!(record.barcode, "111");
        assert_eq!(record.name, "Widget");
        assert_eq!(record.location, "Aisle 3");
        assert_eq!(record.downstack_pallet, "P12");
    }

    #[test]
    fn test_missing_fields_in_form_order() {
        let record = Record::new("222", "Widget", "", " ");
        assert_eq!(record.missing_fields(), vec![LOCATION_FIELD, PALLET_FIELD]);
        assert!(!record.is_complete());
    }

    #[test]
    fn test_bare_record_is_incomplete() {
        let record = Record::bare("333");
        assert_eq!(record.missing_fields().len(), 3);
    }

    #[test]
    fn test_complete_record() {
        assert!(Record::new("111", "Widget", "Aisle 3", "P12").is_complete());
    }

    #[test]
    fn test_update_from_keeps_barcode() {
        let mut record = Record::new("111", "Old", "A1", "P1");
        record.update_from(&Record::new("999", "New", "A2", "P2"));
        assert_eq!(record, Record::new("111", "New", "A2", "P2"));
    }

    #[test]
    fn test_summary() {
        let record = Record::new("111", "Widget", "Aisle 3", "P12");
        assert_eq!(record.summary(), "Item: Widget | Aisle: Aisle 3 | Pallet: P12");
    }

    #[test]
    fn test_json_field_names() {
        let record = Record::new("111", "Widget", "Aisle 3", "P12");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"barcode":"111","name":"Widget","location":"Aisle 3","downstackPallet":"P12"}"#
        );
    }

    #[test]
    fn test_json_missing_metadata_defaults_to_empty() {
        let record: Record = serde_json::from_str(r#"{"barcode":"111"}"#).unwrap();
        assert_eq!(record, Record::bare("111"));
    }
}
