//! Application configuration management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::file_utils::ensure_dir_exists;

/// Main application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub simulation: SimulationConfig,
    pub import: ImportConfig,
    pub archive: ArchiveConfig,
    pub advanced: AdvancedConfig,
}

/// Progress simulation parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    pub tick_interval_ms: u64,
    /// Pause before the first tick of every item (metadata fetch stand-in)
    pub metadata_delay_ms: u64,
    pub min_increment: u8,
    pub max_increment: u8,
    /// Per-tick chance of a simulated failure
    pub failure_probability: f64,
    pub failure_message: String,
    pub min_size_mb: f64,
    pub max_size_mb: f64,
}

/// CSV import configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportConfig {
    /// Rows inspected when looking for a URL-like column
    pub header_scan_rows: usize,
    /// Fixed delimiter; None means detect from the first line
    pub delimiter: Option<char>,
    pub url_keywords: Vec<String>,
    pub title_keywords: Vec<String>,
    /// Also drop rows whose normalized link fails to parse as an http(s) URL
    #[serde(default)]
    pub strict_urls: bool,
}

/// Archive export configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveConfig {
    pub output_directory: String,
    pub file_prefix: String,
    pub entry_extension: String,
}

/// Advanced configuration options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdvancedConfig {
    pub log_level: String, // "error", "warn", "info", "debug", "trace"
    pub persist_batches: bool,
    pub store_directory: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            import: ImportConfig::default(),
            archive: ArchiveConfig::default(),
            advanced: AdvancedConfig::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 300,
            metadata_delay_ms: 800,
            min_increment: 5,
            max_increment: 24,
            failure_probability: 0.005,
            failure_message: "Stream connection lost. Please retry.".to_string(),
            min_size_mb: 10.0,
            max_size_mb: 60.0,
        }
    }
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn metadata_delay(&self) -> Duration {
        Duration::from_millis(self.metadata_delay_ms)
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            header_scan_rows: 5,
            delimiter: None,
            url_keywords: [
                "url", "link", "video", "source", "youtube", "address", "uri", "stream",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            title_keywords: [
                "title",
                "name",
                "label",
                "description",
                "subject",
                "headline",
                "filename",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            strict_urls: false,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            output_directory: ".".to_string(),
            file_prefix: "tubebatch-archive".to_string(),
            entry_extension: "mp4".to_string(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            persist_batches: false,
            store_directory: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file, creating default if not exists
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let config: AppConfig =
                serde_json::from_str(&content).with_context(|| "Failed to parse config file")?;

            tracing::info!("Loaded configuration from: {:?}", config_path);
            Ok(config)
        } else {
            let config = Self::default();
            config.save()?;
            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load the stored configuration, falling back to defaults when it is
    /// missing, unreadable or invalid
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(cfg) => match cfg.validate() {
                Ok(()) => cfg,
                Err(err) => {
                    tracing::warn!(
                        "Invalid configuration detected ({}), falling back to defaults",
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!(
                    "Failed to load configuration from disk: {}. Using defaults",
                    err
                );
                Self::default()
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            ensure_dir_exists(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved configuration to: {:?}", config_path);
        Ok(())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        serde_json::from_str(&content).with_context(|| "Failed to parse config file")
    }

    /// Get the path to the configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "tubebatch", "tubebatch")
            .with_context(|| "Failed to get project directories")?;

        let config_dir = project_dirs.config_dir();
        Ok(config_dir.join("config.json"))
    }

    /// Get the application data directory
    pub fn get_data_dir() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "tubebatch", "tubebatch")
            .with_context(|| "Failed to get project directories")?;

        Ok(project_dirs.data_dir().to_path_buf())
    }

    /// Directory holding persisted batch documents
    pub fn store_dir(&self) -> Result<PathBuf> {
        match &self.advanced.store_directory {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(Self::get_data_dir()?.join("batches")),
        }
    }

    /// Reset configuration to defaults
    pub fn reset() -> Result<Self> {
        let config = Self::default();
        config.save()?;
        tracing::info!("Reset configuration to defaults");
        Ok(config)
    }

    /// Export configuration as JSON string
    pub fn export(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| "Failed to export configuration")
    }

    /// Parse and validate configuration from a JSON string
    pub fn import(json: &str) -> Result<Self> {
        let config: AppConfig =
            serde_json::from_str(json).with_context(|| "Failed to parse imported configuration")?;

        config
            .validate()
            .with_context(|| "Imported configuration is invalid")?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let sim = &self.simulation;

        if sim.tick_interval_ms == 0 || sim.tick_interval_ms > 60_000 {
            anyhow::bail!("Tick interval should be between 1 and 60000 milliseconds");
        }

        if sim.metadata_delay_ms > 60_000 {
            anyhow::bail!("Metadata delay should not exceed 60000 milliseconds");
        }

        if sim.min_increment == 0 || sim.max_increment > 100 {
            anyhow::bail!("Progress increments should be between 1 and 100");
        }

        if sim.min_increment > sim.max_increment {
            anyhow::bail!("Minimum increment must not exceed maximum increment");
        }

        if !(0.0..=1.0).contains(&sim.failure_probability) {
            anyhow::bail!("Failure probability must be between 0.0 and 1.0");
        }

        if sim.min_size_mb <= 0.0 || sim.min_size_mb >= sim.max_size_mb {
            anyhow::bail!("Size range must be positive and non-empty");
        }

        if self.import.header_scan_rows == 0 || self.import.header_scan_rows > 1000 {
            anyhow::bail!("Header scan rows should be between 1 and 1000");
        }

        if let Some(delimiter) = self.import.delimiter {
            if !delimiter.is_ascii() || delimiter == '"' {
                anyhow::bail!("Invalid CSV delimiter: {:?}", delimiter);
            }
        }

        if self.import.url_keywords.is_empty() {
            anyhow::bail!("At least one URL keyword is required");
        }

        if self.archive.file_prefix.trim().is_empty() {
            anyhow::bail!("Archive file prefix must not be empty");
        }

        if !["error", "warn", "info", "debug", "trace"].contains(&self.advanced.log_level.as_str())
        {
            anyhow::bail!(
                "Invalid log level: must be 'error', 'warn', 'info', 'debug', or 'trace'"
            );
        }

        Ok(())
    }
}
