//! `shelfscan` - Barcode shelf-inventory scanner
//!
//! This library reconciles decoded barcodes against a local table of product
//! records (item name, aisle location, downstack pallet), prompts for missing
//! metadata, persists the table in a local key-value slot, and exchanges it as
//! CSV.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod overlay;
pub mod record;
pub mod scanner;
pub mod session;
pub mod storage;
pub mod store;
pub mod symbology;
pub mod table;
pub mod workflow;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use record::Record;
pub use session::Session;
pub use storage::{SqliteSnapshot, Storage, StorageStats};
pub use store::RecordStore;
pub use symbology::Symbology;
