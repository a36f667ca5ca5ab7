//! Configuration management with validation and defaults
//!
//! `EngineConfig` is loaded from an optional TOML file, then overridden from
//! `WAGER_*` environment variables, then validated.

use crate::errors::{ConfigurationError, WagerResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level engine configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub limits: StakeLimits,
    pub grid: GridConfig,
    pub decay: DecayConfig,
    pub monitoring: MonitoringConfig,
}

/// Storage configuration with RocksDB tuning
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub max_write_buffer_number: usize,
    pub target_file_size_mb: usize,
    pub compression_type: CompressionType,
    /// Whether to clear the database on startup (testing only!)
    pub clear_on_start: bool,
    /// Fixed pause before every session store access; 0 disables it.
    pub acquire_delay_ms: u64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: "./DB/wager_data".to_string(),
            write_buffer_size_mb: 16,
            max_write_buffer_number: 2,
            target_file_size_mb: 64,
            compression_type: CompressionType::Lz4,
            clear_on_start: false,
            acquire_delay_ms: 5,
        }
    }
}

impl StorageConfig {
    pub fn acquire_delay(&self) -> Duration {
        Duration::from_millis(self.acquire_delay_ms)
    }
}

/// Bounds on a single stake
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StakeLimits {
    pub min_stake: u64,
    pub max_stake: u64,
}

impl Default for StakeLimits {
    fn default() -> Self {
        Self {
            min_stake: 1,
            max_stake: 1_000_000,
        }
    }
}

impl StakeLimits {
    pub fn allows(&self, stake: u64) -> bool {
        stake >= self.min_stake && stake <= self.max_stake
    }
}

/// Grid-reveal tuning
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GridConfig {
    pub default_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub house_edge_bps: u64,
    /// Discount applied to the progress multiplier on early cash-out.
    pub cashout_penalty_bps: u64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            default_size: 5,
            min_size: 2,
            max_size: 6,
            house_edge_bps: 300,
            cashout_penalty_bps: 500,
        }
    }
}

/// Timed-decay tuning
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecayConfig {
    pub min_phase_secs: u64,
    pub max_phase_secs: u64,
    /// Extra time after the last phase before an ordinary tree withers.
    pub grace_secs: u64,
    /// Chance a tree is planted to wither early at a random stage.
    pub wither_probability: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            min_phase_secs: 1_800,
            max_phase_secs: 5_400,
            grace_secs: 3_600,
            wither_probability: 0.1,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_logging: bool,
    pub log_level: LogLevel,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
            log_level: LogLevel::Info,
        }
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl EngineConfig {
    /// Fast, throwaway settings: no store throttle, short decay phases.
    pub fn testing() -> Self {
        Self {
            storage: StorageConfig {
                clear_on_start: true,
                acquire_delay_ms: 0,
                ..Default::default()
            },
            decay: DecayConfig {
                min_phase_secs: 60,
                max_phase_secs: 120,
                grace_secs: 300,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create configuration for production deployment with persistence
    pub fn production() -> Self {
        Self {
            storage: StorageConfig {
                write_buffer_size_mb: 64,
                max_write_buffer_number: 4,
                target_file_size_mb: 128,
                clear_on_start: false,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                enable_logging: true,
                log_level: LogLevel::Info,
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.storage.data_directory.trim().is_empty() {
            return Err(ConfigurationError::MissingRequired("storage.data_directory".to_string()));
        }
        if self.storage.write_buffer_size_mb == 0 {
            return Err(invalid("storage.write_buffer_size_mb", 0, "must be > 0"));
        }

        if self.limits.min_stake == 0 {
            return Err(invalid("limits.min_stake", 0, "stakes must be positive"));
        }
        if self.limits.min_stake > self.limits.max_stake {
            return Err(invalid(
                "limits.min_stake",
                self.limits.min_stake,
                "must not exceed limits.max_stake",
            ));
        }

        let grid = &self.grid;
        if grid.min_size < 2 || grid.max_size > 6 || grid.min_size > grid.max_size {
            return Err(invalid(
                "grid.min_size/max_size",
                format!("{}..={}", grid.min_size, grid.max_size),
                "grid sizes must lie within 2..=6",
            ));
        }
        if grid.default_size < grid.min_size || grid.default_size > grid.max_size {
            return Err(invalid("grid.default_size", grid.default_size, "outside configured bounds"));
        }
        if grid.house_edge_bps >= 10_000 {
            return Err(invalid("grid.house_edge_bps", grid.house_edge_bps, "must be below 100%"));
        }
        if grid.cashout_penalty_bps == 0 || grid.cashout_penalty_bps >= 10_000 {
            return Err(invalid(
                "grid.cashout_penalty_bps",
                grid.cashout_penalty_bps,
                "must be between 1 and 9999",
            ));
        }

        let decay = &self.decay;
        if decay.min_phase_secs == 0 || decay.min_phase_secs > decay.max_phase_secs {
            return Err(invalid(
                "decay.min_phase_secs",
                decay.min_phase_secs,
                "must be > 0 and not exceed decay.max_phase_secs",
            ));
        }
        if !(0.0..=1.0).contains(&decay.wither_probability) {
            return Err(invalid(
                "decay.wither_probability",
                decay.wither_probability,
                "must lie within [0, 1]",
            ));
        }

        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_directory)
    }
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> WagerResult<EngineConfig> {
        let mut config = match &self.config_path {
            Some(path) => Self::load_from_file(path)?,
            None => EngineConfig::default(),
        };

        Self::apply_overrides(&mut config, |name| env::var(name).ok())?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(path: &Path) -> WagerResult<EngineConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    /// Apply `WAGER_*` overrides from `lookup`.
    fn apply_overrides(
        config: &mut EngineConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigurationError> {
        if let Some(dir) = lookup("WAGER_DATA_DIR") {
            config.storage.data_directory = dir;
        }
        if let Some(delay) = lookup("WAGER_STORE_DELAY_MS") {
            config.storage.acquire_delay_ms = delay
                .parse()
                .map_err(|_| invalid("WAGER_STORE_DELAY_MS", &delay, "expected milliseconds"))?;
        }
        if let Some(level) = lookup("WAGER_LOG_LEVEL") {
            config.monitoring.log_level = level
                .parse()
                .map_err(|e: String| invalid("WAGER_LOG_LEVEL", &level, &e))?;
        }
        if let Some(max) = lookup("WAGER_MAX_STAKE") {
            config.limits.max_stake = max
                .parse()
                .map_err(|_| invalid("WAGER_MAX_STAKE", &max, "expected a whole number"))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &EngineConfig, path: &Path) -> WagerResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string).map_err(|e| {
            ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path.display(), e)).into()
        })
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &Path) -> WagerResult<()> {
    ConfigLoader::new().save(&EngineConfig::production(), path)
}
