//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Lookup command arguments.
#[derive(Debug, Args)]
pub struct LookupCommand {
    /// Barcode to look up
    pub barcode: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Add command arguments.
#[derive(Debug, Args)]
pub struct AddCommand {
    /// Barcode of the new product
    #[arg(short, long)]
    pub barcode: String,

    /// Item name
    #[arg(short, long)]
    pub name: String,

    /// Aisle location
    #[arg(short, long)]
    pub location: String,

    /// Downstack pallet
    #[arg(short, long)]
    pub pallet: String,
}

/// Set command arguments.
#[derive(Debug, Args)]
pub struct SetCommand {
    /// Barcode to create or update
    pub barcode: String,

    /// Item name
    #[arg(short, long)]
    pub name: String,

    /// Aisle location
    #[arg(short, long)]
    pub location: String,

    /// Downstack pallet
    #[arg(short, long)]
    pub pallet: String,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Where to write the CSV (defaults to the configured file name in the
    /// current directory)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// CSV file to merge into the store
    pub file: PathBuf,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}
