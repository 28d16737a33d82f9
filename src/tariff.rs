//! Tariff selection
//!
//! Maps a configured tariff name onto the price sources for that tariff. The
//! mapping is a table keyed by [`Tariff`]; resolution is pure and does no I/O.

use crate::config::{TariffSettings, TariffSourceConfig};
use crate::error::{MonitorError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Recognized Octopus tariffs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tariff {
    /// Half-hourly wholesale-tracking prices
    Agile,
    /// Single standard variable rate
    Flexible,
    /// Cheap overnight window, flat day rate
    Go,
    /// One rate per day
    Tracker,
}

impl Tariff {
    pub const ALL: [Tariff; 4] = [Tariff::Agile, Tariff::Flexible, Tariff::Go, Tariff::Tracker];

    /// Configuration name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agile => "AGILE",
            Self::Flexible => "FLEXIBLE",
            Self::Go => "GO",
            Self::Tracker => "TRACKER",
        }
    }

    /// Lowercase key used for config sections and cache directories
    pub fn key(&self) -> &'static str {
        match self {
            Self::Agile => "agile",
            Self::Flexible => "flexible",
            Self::Go => "go",
            Self::Tracker => "tracker",
        }
    }
}

impl fmt::Display for Tariff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tariff {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "AGILE" => Ok(Self::Agile),
            "FLEXIBLE" => Ok(Self::Flexible),
            "GO" => Ok(Self::Go),
            "TRACKER" => Ok(Self::Tracker),
            _ => Err(MonitorError::unknown_tariff(s)),
        }
    }
}

/// The active tariff and everything needed to price it.
///
/// Built once at startup and shared read-only between tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct TariffConfig {
    pub tariff: Tariff,
    pub electricity_url: String,
    pub gas_url: Option<String>,
    /// Full path of the offline snapshot
    pub offline_file: PathBuf,
    pub vat_percent: f64,
    /// Exclusive of VAT
    pub default_unit_price: f64,
    pub offline: bool,
}

impl TariffConfig {
    /// Snapshot file name without its directory
    pub fn offline_file_name(&self) -> String {
        self.offline_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Resolves tariff names against the configured source table
#[derive(Debug, Clone)]
pub struct TariffSelector {
    settings: TariffSettings,
}

impl TariffSelector {
    pub fn new(settings: &TariffSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Look up the sources for `tariff_name`.
    ///
    /// Fails with [`MonitorError::UnknownTariff`] for anything other than
    /// AGILE, FLEXIBLE, GO or TRACKER (case-insensitive).
    pub fn resolve(&self, tariff_name: &str, offline: bool) -> Result<TariffConfig> {
        let tariff: Tariff = tariff_name.parse()?;
        let TariffSourceConfig {
            electricity_url,
            gas_url,
            offline_file,
        } = self.settings.source_for(tariff).clone();

        Ok(TariffConfig {
            tariff,
            electricity_url,
            gas_url: gas_url.filter(|u| !u.trim().is_empty()),
            offline_file: self.settings.offline_directory().join(offline_file),
            vat_percent: self.settings.vat_percent,
            default_unit_price: self.settings.default_unit_price,
            offline,
        })
    }

    /// Resolve the tariff named in the configuration
    pub fn resolve_configured(&self) -> Result<TariffConfig> {
        self.resolve(&self.settings.name, self.settings.offline)
    }
}
