//! Configuration management for the energy monitor
//!
//! This module handles loading and validation of the application configuration
//! from YAML files, with environment variable overrides for API credentials.
//! The configuration is read once at startup and never reloaded.

use crate::error::{MonitorError, Result};
use crate::tariff::Tariff;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod defaults;

/// Environment variable overriding `tariff.api_key`
pub const API_KEY_ENV: &str = "OCTOPUS_API_KEY";
/// Environment variable overriding `tariff.api_pass`
pub const API_PASS_ENV: &str = "OCTOPUS_API_PASS";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Use the simulated light sensor instead of hardware
    pub debug: bool,

    /// Light sensor timing and smoothing constants
    pub sensor: SensorConfig,

    /// Tariff selection and pricing API settings
    pub tariff: TariffSettings,

    /// Screen settings handed to the display adapter
    pub display: DisplayConfig,

    /// Reading log settings
    pub readings: ReadingsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Light sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Directory of the IIO light sensor device
    pub device_path: String,

    /// Time the sensor accumulates light for one reading
    pub light_integration_time_ms: u64,

    /// Repeat rate programmed into the sensor
    pub light_repeat_rate_ms: u64,

    /// Delay between sampling ticks
    pub sleep_time_between_readings_ms: u64,

    /// Readings closer than this to the last accepted lux are suppressed
    pub min_lux_difference_for_reading: f64,

    /// A gap wider than `last_interval * multiplier` is smoothed
    pub smoothing_interval_multiplier: f64,

    /// Maximum synthetic readings per gap; 0 disables smoothing
    pub smoothing_limit: usize,

    /// Lower bound of simulated lux values
    pub simulated_min_lux: f64,

    /// Upper bound of simulated lux values
    pub simulated_max_lux: f64,

    /// Fixed seed for the simulated sensor (random when unset)
    pub simulated_seed: Option<u64>,
}

/// Price source for one tariff
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TariffSourceConfig {
    /// Standard unit rates endpoint for electricity
    pub electricity_url: String,

    /// Standard unit rates endpoint for gas, if the tariff has one
    #[serde(default)]
    pub gas_url: Option<String>,

    /// Snapshot file name under `<prices_directory>/offline`
    pub offline_file: String,
}

/// Tariff and pricing API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TariffSettings {
    /// Active tariff name (AGILE, FLEXIBLE, GO, TRACKER)
    pub name: String,

    /// Never touch the network; read offline snapshots only
    pub offline: bool,

    /// VAT percentage applied to exclusive-of-VAT unit rates
    pub vat_percent: f64,

    /// Unit price (p/kWh, exclusive of VAT) used when every source fails
    pub default_unit_price: f64,

    /// API key used as basic auth username
    pub api_key: String,

    /// API password (usually empty for Octopus)
    pub api_pass: String,

    /// Consumption endpoint; requires an API key
    pub electricity_usage_url: Option<String>,

    /// Root directory for offline snapshots and daily caches
    pub prices_directory: String,

    /// Local timezone used for half-hour slots
    pub timezone: String,

    /// HTTP request timeout
    pub request_timeout_secs: u64,

    /// Maximum API pages followed per request
    pub max_pages: u32,

    /// Upper bound between price refreshes
    pub price_refresh_interval_secs: u64,

    pub agile: TariffSourceConfig,
    pub flexible: TariffSourceConfig,
    pub go: TariffSourceConfig,
    pub tracker: TariffSourceConfig,
}

/// Display configuration (consumed by the external renderer)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub show_fps: bool,
}

/// Reading log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingsConfig {
    /// Append emitted readings to daily CSV files
    pub enabled: bool,

    /// Directory holding `<YYYY-MM-DD>.csv` reading logs
    pub directory: String,

    /// Meter LED pulses per kWh; each logged reading is one pulse
    pub blinks_per_kwh: f64,

    /// Interval between usage and cost recalculations
    pub usage_refresh_interval_secs: u64,
}

impl ReadingsConfig {
    /// Directory of cached per-day usage totals
    pub fn totals_directory(&self) -> PathBuf {
        Path::new(&self.directory).join("totals")
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (its parent directory receives rotated files)
    pub file: String,

    /// Number of backup files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl TariffSettings {
    /// Price source entry for a tariff
    pub fn source_for(&self, tariff: Tariff) -> &TariffSourceConfig {
        match tariff {
            Tariff::Agile => &self.agile,
            Tariff::Flexible => &self.flexible,
            Tariff::Go => &self.go,
            Tariff::Tracker => &self.tracker,
        }
    }

    /// Directory holding the per-tariff offline snapshots
    pub fn offline_directory(&self) -> PathBuf {
        Path::new(&self.prices_directory).join("offline")
    }

    /// Parsed local timezone for slots and day windows
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone.trim().parse::<chrono_tz::Tz>().map_err(|_| {
            MonitorError::validation("tariff.timezone", "Unknown IANA timezone")
        })
    }

    /// Whether API credentials are configured
    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "energy_monitor.yaml",
            "data/config.yaml",
            "/etc/energy-monitor/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Apply credential overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply credential overrides from an arbitrary lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.tariff.api_key = key;
        }
        if let Some(pass) = lookup(API_PASS_ENV) {
            self.tariff.api_pass = pass;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let sensor = &self.sensor;
        if sensor.sleep_time_between_readings_ms == 0 {
            return Err(MonitorError::validation(
                "sensor.sleep_time_between_readings_ms",
                "Must be greater than 0",
            ));
        }

        if sensor.light_integration_time_ms == 0 {
            return Err(MonitorError::validation(
                "sensor.light_integration_time_ms",
                "Must be greater than 0",
            ));
        }

        if !(sensor.min_lux_difference_for_reading >= 0.0) {
            return Err(MonitorError::validation(
                "sensor.min_lux_difference_for_reading",
                "Must be zero or positive",
            ));
        }

        if !(sensor.smoothing_interval_multiplier >= 1.0) {
            return Err(MonitorError::validation(
                "sensor.smoothing_interval_multiplier",
                "Must be at least 1.0",
            ));
        }

        if sensor.simulated_min_lux < 0.0 || sensor.simulated_max_lux < sensor.simulated_min_lux {
            return Err(MonitorError::validation(
                "sensor.simulated_max_lux",
                "Simulated lux range must be non-negative and ordered",
            ));
        }

        let tariff = &self.tariff;
        let active: Tariff = tariff.name.parse()?;

        if !(tariff.vat_percent >= 0.0) {
            return Err(MonitorError::validation(
                "tariff.vat_percent",
                "Must be zero or positive",
            ));
        }

        if !(tariff.default_unit_price >= 0.0) {
            return Err(MonitorError::validation(
                "tariff.default_unit_price",
                "Must be zero or positive",
            ));
        }

        tariff.tz()?;

        if tariff.request_timeout_secs == 0 {
            return Err(MonitorError::validation(
                "tariff.request_timeout_secs",
                "Must be greater than 0",
            ));
        }

        if tariff.max_pages == 0 {
            return Err(MonitorError::validation(
                "tariff.max_pages",
                "Must be greater than 0",
            ));
        }

        if tariff.price_refresh_interval_secs == 0 {
            return Err(MonitorError::validation(
                "tariff.price_refresh_interval_secs",
                "Must be greater than 0",
            ));
        }

        let readings = &self.readings;
        if !(readings.blinks_per_kwh > 0.0 && readings.blinks_per_kwh.is_finite()) {
            return Err(MonitorError::validation(
                "readings.blinks_per_kwh",
                "Must be a positive number",
            ));
        }

        if readings.usage_refresh_interval_secs == 0 {
            return Err(MonitorError::validation(
                "readings.usage_refresh_interval_secs",
                "Must be greater than 0",
            ));
        }

        for t in Tariff::ALL {
            let source = tariff.source_for(t);
            if source.offline_file.trim().is_empty() {
                return Err(MonitorError::Validation {
                    field: format!("tariff.{}.offline_file", t.key()),
                    message: "Cannot be empty".to_string(),
                });
            }
        }

        if !tariff.offline && tariff.source_for(active).electricity_url.trim().is_empty() {
            return Err(MonitorError::Validation {
                field: format!("tariff.{}.electricity_url", active.key()),
                message: "Required when not offline".to_string(),
            });
        }

        Ok(())
    }
}
