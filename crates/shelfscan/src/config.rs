//! Configuration management for shelfscan.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::symbology::Symbology;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "shelfscan";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "shelfscan.db";

/// Default seed CSV file name, looked up in the data directory.
const SEED_FILE_NAME: &str = "data.csv";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SHELFSCAN_`)
/// 2. TOML config file at `~/.config/shelfscan/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Scanner configuration.
    pub scanner: ScannerConfig,
    /// Overlay configuration.
    pub overlay: OverlayConfig,
    /// Notice configuration.
    pub notices: NoticeConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/shelfscan/shelfscan.db`
    pub database_path: Option<PathBuf>,
    /// Slot key the record snapshot is stored under.
    pub snapshot_key: String,
    /// CSV file read when no snapshot exists yet.
    /// Defaults to `~/.local/share/shelfscan/data.csv`
    pub seed_csv: Option<PathBuf>,
    /// File name used for CSV exports.
    pub export_file_name: String,
}

/// Scanner-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Symbologies the decoder accepts.
    pub readers: Vec<Symbology>,
    /// Drop UPC/EAN reads whose check digit is wrong.
    pub verify_check_digits: bool,
    /// Delay before scanning resumes after showing a complete record.
    pub resume_delay_ms: u64,
    /// Requested camera frame width.
    pub frame_width: u32,
    /// Requested camera frame height.
    pub frame_height: u32,
    /// Requested camera facing mode (`environment` is the rear camera).
    pub facing_mode: String,
}

/// Overlay drawing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Guide rectangle width as a fraction of the surface width.
    pub guide_width_ratio: f64,
    /// Guide rectangle height as a fraction of the surface height.
    pub guide_height_ratio: f64,
    /// Colour of candidate detection regions.
    pub candidate_color: String,
    /// Colour of the best-match region.
    pub match_color: String,
    /// Colour of the decoded scan line.
    pub line_color: String,
    /// Guide colour while waiting for a barcode.
    pub guide_color: String,
    /// Guide colour on the frame after a detection.
    pub guide_success_color: String,
    /// Label shown while waiting for a barcode.
    pub guide_label: String,
    /// Label shown on the frame after a detection.
    pub guide_success_label: String,
    /// Stroke width for detection paths.
    pub path_line_width: f64,
    /// Stroke width for the guide rectangle.
    pub guide_line_width: f64,
}

/// User-visible notice configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoticeConfig {
    /// How long a transient notice stays visible.
    pub display_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            snapshot_key: "records".to_string(),
            seed_csv: None,
            export_file_name: "updated_data.csv".to_string(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            readers: Symbology::ALL.to_vec(),
            verify_check_digits: true,
            resume_delay_ms: 3000,
            frame_width: 640,
            frame_height: 480,
            facing_mode: "environment".to_string(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            guide_width_ratio: 0.6,
            guide_height_ratio: 0.2,
            candidate_color: "rgba(0, 255, 0, 0.3)".to_string(),
            match_color: "#00FF00".to_string(),
            line_color: "#FF0000".to_string(),
            guide_color: "rgba(255, 0, 0, 0.7)".to_string(),
            guide_success_color: "rgba(0, 200, 0, 0.9)".to_string(),
            guide_label: "Align barcode inside the box".to_string(),
            guide_success_label: "Barcode detected".to_string(),
            path_line_width: 2.0,
            guide_line_width: 4.0,
        }
    }
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self { display_ms: 3000 }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SHELFSCAN_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.snapshot_key.trim().is_empty() {
            return Err(invalid("snapshot_key must not be empty"));
        }
        if self.storage.export_file_name.trim().is_empty() {
            return Err(invalid("export_file_name must not be empty"));
        }
        if self.scanner.readers.is_empty() {
            return Err(invalid("readers must enable at least one symbology"));
        }
        if self.scanner.resume_delay_ms == 0 {
            return Err(invalid("resume_delay_ms must be greater than 0"));
        }
        if self.scanner.frame_width == 0 || self.scanner.frame_height == 0 {
            return Err(invalid("frame_width and frame_height must be greater than 0"));
        }

        for (name, ratio) in [
            ("guide_width_ratio", self.overlay.guide_width_ratio),
            ("guide_height_ratio", self.overlay.guide_height_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(invalid(format!("{name} must be in (0, 1], got {ratio}")));
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the seed CSV path, resolving defaults if not set.
    #[must_use]
    pub fn seed_csv_path(&self) -> PathBuf {
        self.storage
            .seed_csv
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(SEED_FILE_NAME))
    }

    /// Get the resume delay as a Duration.
    #[must_use]
    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.scanner.resume_delay_ms)
    }

    /// Get the notice display time as a Duration.
    #[must_use]
    pub fn notice_duration(&self) -> Duration {
        Duration::from_millis(self.notices.display_ms)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
