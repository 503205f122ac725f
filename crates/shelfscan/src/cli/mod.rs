//! Command-line interface for shelfscan.
//!
//! This module provides the CLI structure and the terminal front end used by
//! the `shelfscan` binary.

mod commands;
pub mod console;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AddCommand, ConfigCommand, ExportCommand, ImportCommand, ListCommand, LookupCommand,
    OutputFormat, SetCommand, StatusCommand,
};

/// shelfscan - Barcode shelf-inventory scanner
///
/// Scan product barcodes, attach item name, aisle location and downstack
/// pallet to each one, and exchange the table as CSV.
#[derive(Debug, Parser)]
#[command(name = "shelfscan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan barcodes from a keyboard-wedge scanner or piped input
    Scan,

    /// Show the record for a barcode
    Lookup(LookupCommand),

    /// Add a new product (fails if the barcode exists)
    Add(AddCommand),

    /// Create or update the record for a barcode
    Set(SetCommand),

    /// List all records
    List(ListCommand),

    /// Export all records as CSV
    Export(ExportCommand),

    /// Merge records from a CSV file
    Import(ImportCommand),

    /// Show store status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
