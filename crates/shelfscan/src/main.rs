//! `shelfscan` - CLI for the shelf-inventory scanner
//!
//! This binary runs interactive scanning sessions and manages the local
//! record store.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use shelfscan::cli::console::{render_table, ConsoleNotifier, ScanConsole, TerminalSurface};
use shelfscan::cli::{
    AddCommand, Cli, Command, ConfigCommand, ExportCommand, ImportCommand, ListCommand,
    LookupCommand, OutputFormat, SetCommand, StatusCommand,
};
use shelfscan::scanner::TextFeedDecoder;
use shelfscan::session::Session;
use shelfscan::storage::Slot;
use shelfscan::store::UpsertOutcome;
use shelfscan::{init_logging, Config, Record, RecordStore, SqliteSnapshot, Storage};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("Failed to load configuration")?;

    // Execute the command
    match cli.command {
        Command::Scan => handle_scan(&config),
        Command::Lookup(cmd) => handle_lookup(&config, &cmd),
        Command::Add(cmd) => handle_add(&config, &cmd),
        Command::Set(cmd) => handle_set(&config, &cmd),
        Command::List(cmd) => handle_list(&config, &cmd),
        Command::Export(cmd) => handle_export(&config, &cmd),
        Command::Import(cmd) => handle_import(&config, &cmd),
        Command::Status(cmd) => handle_status(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

/// Open the database and load the record store from it.
fn open_store(config: &Config) -> anyhow::Result<RecordStore> {
    let storage = open_storage(config)?;
    Ok(load_store(config, storage))
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn load_store(config: &Config, storage: Storage) -> RecordStore {
    let snapshot = SqliteSnapshot::new(storage, config.storage.snapshot_key.clone());
    let seed = config.seed_csv_path();
    let (store, report) = RecordStore::load(Box::new(snapshot), Some(&seed));
    if let Some(warning) = report.warning {
        eprintln!("warning: {warning}");
    }
    store
}

fn handle_scan(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    runtime.block_on(run_scan(config, store))
}

async fn run_scan(config: &Config, store: RecordStore) -> anyhow::Result<()> {
    let loaded = store.len();
    let (line_tx, line_rx) = mpsc::channel::<String>(64);
    let (event_tx, event_rx) = mpsc::channel(64);
    let (command_tx, command_rx) = mpsc::channel(8);

    let decoder = TextFeedDecoder::new(line_rx);
    let progress = decoder.progress();
    let mut session = Session::new(
        config,
        store,
        decoder,
        TerminalSurface::new(&config.scanner, io::stdout()),
        ConsoleNotifier::new(io::stdout()),
    );
    session
        .start(event_tx)
        .await
        .context("Scanner could not start")?;
    let phases = session.subscribe_phase();

    let runner = tokio::spawn(async move {
        session.run(event_rx, command_rx).await;
        session
    });

    println!("Scanning ({loaded} records loaded). Scan or type a barcode; Ctrl-D to finish.");

    let mut console = ScanConsole::new(line_tx, progress, command_tx, phases, io::stdout());
    let routed = console.run(BufReader::new(tokio::io::stdin())).await;
    // Closing the feed ends the session.
    drop(console);
    let session = runner.await.context("Scanning session panicked")?;
    routed.context("Scanning input failed")?;
    println!("{} records stored.", session.store().len());
    Ok(())
}

fn handle_lookup(config: &Config, cmd: &LookupCommand) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let record = store.find_by_barcode(cmd.barcode.trim());

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }
    match record {
        Some(record) if record.is_complete() => println!("{}", record.summary()),
        Some(record) => println!(
            "{} (incomplete, missing: {})",
            record.summary(),
            record.missing_fields().join(", ")
        ),
        None => println!("No record for barcode {}", cmd.barcode.trim()),
    }
    Ok(())
}

fn handle_add(config: &Config, cmd: &AddCommand) -> anyhow::Result<()> {
    let mut store = open_store(config)?;
    let record = Record::new(&cmd.barcode, &cmd.name, &cmd.location, &cmd.pallet);
    let barcode = record.barcode.clone();

    match store.insert_new(record) {
        Ok(()) => {
            println!("Product added successfully: {barcode}");
            Ok(())
        }
        Err(e) if e.is_duplicate() => bail!("This barcode already exists: {barcode}"),
        Err(e) => Err(e.into()),
    }
}

fn handle_set(config: &Config, cmd: &SetCommand) -> anyhow::Result<()> {
    let record = Record::new(&cmd.barcode, &cmd.name, &cmd.location, &cmd.pallet);
    if record.barcode.is_empty() || !record.is_complete() {
        bail!("Please fill in all fields.");
    }

    let mut store = open_store(config)?;
    let barcode = record.barcode.clone();
    let outcome = store.upsert(record).context("Failed to save record")?;
    let verb = match outcome {
        UpsertOutcome::Inserted => "created",
        UpsertOutcome::Updated => "updated",
    };
    println!("Information saved: {barcode} {verb}");
    Ok(())
}

fn handle_list(config: &Config, cmd: &ListCommand) -> anyhow::Result<()> {
    let store = open_store(config)?;
    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(store.records())?),
        OutputFormat::Table => print!("{}", render_table(store.records())),
        OutputFormat::Plain => {
            for record in store.records() {
                println!("{}  {}", record.barcode, record.summary());
            }
        }
    }
    Ok(())
}

fn handle_export(config: &Config, cmd: &ExportCommand) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let path = cmd
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.storage.export_file_name));

    match store
        .export_to_file(&path)
        .with_context(|| format!("Failed to export to {}", path.display()))?
    {
        Some(count) => println!("Exported {count} records to {}", path.display()),
        None => println!("No data to export."),
    }
    Ok(())
}

fn handle_import(config: &Config, cmd: &ImportCommand) -> anyhow::Result<()> {
    let text = read_import_file(&cmd.file)?;
    let mut store = open_store(config)?;
    let summary = store
        .import_and_merge_csv(&text)
        .with_context(|| format!("Error parsing CSV file {}", cmd.file.display()))?;

    println!(
        "Imported {} new records ({} duplicates skipped, {} rows without barcode).",
        summary.added, summary.duplicates, summary.skipped
    );
    Ok(())
}

fn read_import_file(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    String::from_utf8(bytes).with_context(|| format!("{} is not valid UTF-8", path.display()))
}

fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;
    let slot: Option<Slot> = storage.get(&config.storage.snapshot_key)?;
    let store = load_store(config, storage);
    let complete = store.records().iter().filter(|r| r.is_complete()).count();

    if cmd.json {
        let status = serde_json::json!({
            "records": store.len(),
            "complete": complete,
            "incomplete": store.len() - complete,
            "database_path": config.database_path(),
            "db_size_bytes": stats.db_size_bytes,
            "snapshot": slot.as_ref().map(|slot| serde_json::json!({
                "key": slot.key,
                "digest": slot.digest,
                "saved_at": slot.saved_at.to_rfc3339(),
                "intact": slot.is_intact(),
            })),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("shelfscan status");
        println!("----------------");
        println!(
            "Records:       {} ({} complete, {} incomplete)",
            store.len(),
            complete,
            store.len() - complete
        );
        println!("Database:      {}", config.database_path().display());
        println!("Size:          {} bytes", stats.db_size_bytes);
        match &slot {
            Some(slot) => {
                println!("Snapshot:      {} saved {}", slot.key, slot.saved_at.to_rfc3339());
                println!(
                    "Digest:        {} ({})",
                    slot.digest,
                    if slot.is_intact() { "intact" } else { "CORRUPT" }
                );
            }
            None => println!("Snapshot:      none"),
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                let readers: Vec<String> =
                    config.scanner.readers.iter().map(ToString::to_string).collect();
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Snapshot key:       {}", config.storage.snapshot_key);
                println!("  Seed CSV:           {}", config.seed_csv_path().display());
                println!("  Export file name:   {}", config.storage.export_file_name);
                println!();
                println!("[Scanner]");
                println!("  Readers:            {}", readers.join(", "));
                println!("  Verify check digit: {}", config.scanner.verify_check_digits);
                println!("  Resume delay (ms):  {}", config.scanner.resume_delay_ms);
                println!(
                    "  Frame:              {}x{} ({})",
                    config.scanner.frame_width,
                    config.scanner.frame_height,
                    config.scanner.facing_mode
                );
                println!();
                println!("[Notices]");
                println!("  Display (ms):       {}", config.notices.display_ms);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
