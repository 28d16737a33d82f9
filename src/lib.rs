//! # Energy Monitor - ambient light and tariff price monitor
//!
//! A kiosk-style monitor that watches the consumption LED of an electricity
//! meter with a light sensor, and shows live power, today's cost and the
//! current Octopus Energy unit price for the configured UK tariff.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `logging`: Structured logging and tracing
//! - `sensor`: Hardware and simulated light sources
//! - `smoothing`: Adaptive smoothing of light readings
//! - `readings`: Daily CSV reading log
//! - `usage`: Power, consumption and cost from the reading log
//! - `slots`: Half-hour unit price slots
//! - `tariff`: Tariff selection
//! - `prices`: Price fetching, offline snapshots and fallback policy
//! - `display`: Display updates handed to the renderer
//! - `monitor`: Task wiring and shutdown

pub mod config;
pub mod display;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod prices;
pub mod readings;
pub mod sensor;
pub mod slots;
pub mod smoothing;
pub mod tariff;
pub mod usage;


// Re-export commonly used types
pub use config::Config;
pub use error::{MonitorError, Result};
pub use monitor::EnergyMonitor;
pub use tariff::{Tariff, TariffConfig, TariffSelector};
