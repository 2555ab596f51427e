//! Configuration management for Cascade
//!
//! This module provides:
//! - Engine settings (sample rate, block size, queue capacities)
//! - Initial filter settings per slot
//! - TOML load/save and a default config location

use crate::domain::params::{limits, FilterParameters, FilterSettings, FilterType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Real-time engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,

    /// Maximum block size in frames
    pub block_size: usize,

    /// Number of audio channels, each with its own filter chains
    pub channels: usize,

    /// Stages each filter chain can hold; bounds the cut filter order
    pub stage_capacity: usize,

    /// Snapshots the parameter queue can hold before rejecting writes
    pub parameter_queue_capacity: usize,

    /// Retired cascades each chain can hand back before it defers swaps
    pub retire_queue_capacity: usize,

    /// Processed blocks the diagnostic tap can hold
    pub tap_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 512,
            channels: 2,
            stage_capacity: (limits::ORDER_MAX as usize).div_ceil(2),
            parameter_queue_capacity: 64,
            retire_queue_capacity: 8,
            tap_capacity: 16,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }

        let sizes = [
            ("block_size", self.block_size),
            ("channels", self.channels),
            ("stage_capacity", self.stage_capacity),
            ("parameter_queue_capacity", self.parameter_queue_capacity),
            ("retire_queue_capacity", self.retire_queue_capacity),
            ("tap_capacity", self.tap_capacity),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }

        Ok(())
    }
}

/// Complete Cascade configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Initial settings, one entry per filter slot
    #[serde(default)]
    pub slots: Vec<FilterSettings>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            slots: vec![FilterSettings::Standard(FilterParameters::new(
                FilterType::FirstOrderLowPass,
                limits::FREQ_DEFAULT,
                limits::Q_DEFAULT,
                48000.0,
            ))],
        }
    }
}

impl CascadeConfig {
    /// Check engine settings and every slot against the parameter ranges
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;

        if self.slots.is_empty() {
            return Err(ConfigError::Invalid("at least one slot is required".to_string()));
        }

        for (index, settings) in self.initial_settings().iter().enumerate() {
            settings
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("slot {index}: {e}")))?;
            check_ranges(index, settings)?;

            if settings.stage_count() > self.engine.stage_capacity {
                return Err(ConfigError::Invalid(format!(
                    "slot {index}: {} stages exceed stage_capacity {}",
                    settings.stage_count(),
                    self.engine.stage_capacity
                )));
            }
        }

        Ok(())
    }

    /// Slot settings re-stamped with the engine sample rate
    pub fn initial_settings(&self) -> Vec<FilterSettings> {
        self.slots
            .iter()
            .map(|settings| settings.with_sample_rate(self.engine.sample_rate))
            .collect()
    }

    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!(slots = config.slots.len(), "Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }
}

fn check_ranges(index: usize, settings: &FilterSettings) -> Result<()> {
    let base = settings.base();
    if !(limits::FREQ_MIN..=limits::FREQ_MAX).contains(&base.frequency) {
        return Err(ConfigError::Invalid(format!(
            "slot {index}: frequency {} outside {}..={} Hz",
            base.frequency,
            limits::FREQ_MIN,
            limits::FREQ_MAX
        )));
    }

    match settings {
        FilterSettings::Standard(params) => {
            if !(limits::Q_MIN..=limits::Q_MAX).contains(&base.quality) {
                return Err(ConfigError::Invalid(format!(
                    "slot {index}: quality {} outside {}..={}",
                    base.quality,
                    limits::Q_MIN,
                    limits::Q_MAX
                )));
            }
            if !(limits::GAIN_DB_MIN..=limits::GAIN_DB_MAX).contains(&params.gain_in_decibels) {
                return Err(ConfigError::Invalid(format!(
                    "slot {index}: gain {}dB outside {}..={} dB",
                    params.gain_in_decibels,
                    limits::GAIN_DB_MIN,
                    limits::GAIN_DB_MAX
                )));
            }
        }
        FilterSettings::Cut(params) => {
            if params.order > limits::ORDER_MAX {
                return Err(ConfigError::Invalid(format!(
                    "slot {index}: order {} above {}",
                    params.order,
                    limits::ORDER_MAX
                )));
            }
        }
    }

    Ok(())
}

/// Locates and loads the user's configuration file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            config_path: config_dir.join("config.toml"),
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/cascade` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("cascade"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// A missing file yields the defaults. A corrupt or invalid file is
    /// logged and also yields the defaults.
    #[instrument(skip(self))]
    pub async fn load(&self) -> CascadeConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, using defaults"
            );
            return CascadeConfig::default();
        }

        match CascadeConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using defaults"
                );
                CascadeConfig::default()
            }
        }
    }

    pub async fn save(&self, config: &CascadeConfig) -> Result<()> {
        config.save_to_file(&self.config_path).await
    }
}
