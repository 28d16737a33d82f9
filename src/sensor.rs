//! Ambient light sampling
//!
//! This module wraps the light sensor behind the [`LightSource`] capability.
//! Production builds read an LTR-559 (or any IIO light sensor) through the
//! Linux industrial I/O sysfs interface; debug mode swaps in a seeded
//! pseudo-random source. The variant is chosen once, at construction.

use crate::config::{Config, SensorConfig};
use crate::error::{MonitorError, Result};
use crate::logging::get_logger;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Duration;

/// Where a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingSource {
    /// Measured by the hardware sensor
    Sensor,
    /// Inserted by the smoother between two accepted readings
    Interpolated,
    /// Produced by the simulated sensor
    Synthetic,
}

impl ReadingSource {
    /// Record type written to the reading log
    pub fn record_type(&self) -> &'static str {
        match self {
            Self::Sensor => "original",
            Self::Interpolated => "fixed",
            Self::Synthetic => "generated",
        }
    }
}

/// A single lux reading. Lux is always finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub lux: f64,
    pub source: ReadingSource,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, lux: f64, source: ReadingSource) -> Result<Self> {
        if !lux.is_finite() || lux < 0.0 {
            return Err(MonitorError::validation(
                "lux",
                "must be finite and non-negative",
            ));
        }
        Ok(Self {
            timestamp,
            lux,
            source,
        })
    }

    /// Whether this reading was derived rather than measured
    pub fn is_interpolated(&self) -> bool {
        self.source == ReadingSource::Interpolated
    }
}

/// Capability to produce raw lux values
#[async_trait::async_trait]
pub trait LightSource: Send {
    /// Take one lux measurement. May block for the integration time.
    async fn read_lux(&mut self) -> Result<f64>;

    /// Tag for readings produced by this source
    fn reading_source(&self) -> ReadingSource;

    /// Bring the device back after a failed read
    async fn reinitialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

/// IIO sysfs light sensor (`ltr501` driver family covers the LTR-559)
pub struct HardwareSensor {
    device_path: PathBuf,
    integration_time: Duration,
    repeat_rate: Duration,
    logger: crate::logging::StructuredLogger,
}

impl HardwareSensor {
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            device_path: PathBuf::from(&config.device_path),
            integration_time: Duration::from_millis(config.light_integration_time_ms),
            repeat_rate: Duration::from_millis(config.light_repeat_rate_ms),
            logger: get_logger("sensor"),
        }
    }

    /// Check the device exists and program integration time and repeat rate.
    ///
    /// Drivers that do not expose the tuning attributes keep their defaults.
    pub async fn init(&mut self) -> Result<()> {
        if !tokio::fs::try_exists(&self.device_path)
            .await
            .unwrap_or(false)
        {
            return Err(MonitorError::sensor(format!(
                "light sensor device {} not found",
                self.device_path.display()
            )));
        }

        let integration = format!("{:.6}", self.integration_time.as_secs_f64());
        if let Err(e) = self
            .write_attr("in_illuminance_integration_time", &integration)
            .await
        {
            self.logger
                .debug(&format!("Integration time not settable: {}", e));
        }

        if !self.repeat_rate.is_zero() {
            let hz = format!("{:.3}", 1.0 / self.repeat_rate.as_secs_f64());
            if let Err(e) = self.write_attr("sampling_frequency", &hz).await {
                self.logger
                    .debug(&format!("Sampling frequency not settable: {}", e));
            }
        }

        self.logger.info(&format!(
            "Light sensor ready at {} (integration {:?}, repeat {:?})",
            self.device_path.display(),
            self.integration_time,
            self.repeat_rate
        ));
        Ok(())
    }

    async fn write_attr(&self, name: &str, value: &str) -> std::io::Result<()> {
        tokio::fs::write(self.device_path.join(name), value).await
    }

    async fn read_attr(&self, name: &str) -> Result<f64> {
        let path = self.device_path.join(name);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MonitorError::sensor(format!("{}: {}", path.display(), e)))?;
        raw.trim()
            .parse::<f64>()
            .map_err(|e| MonitorError::sensor(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait::async_trait]
impl LightSource for HardwareSensor {
    async fn read_lux(&mut self) -> Result<f64> {
        tokio::time::sleep(self.integration_time).await;

        // Processed lux when the driver provides it, raw * scale otherwise
        match self.read_attr("in_illuminance_input").await {
            Ok(lux) => Ok(lux),
            Err(_) => {
                let raw = self.read_attr("in_illuminance_raw").await?;
                let scale = self.read_attr("in_illuminance_scale").await.unwrap_or(1.0);
                Ok(raw * scale)
            }
        }
    }

    fn reading_source(&self) -> ReadingSource {
        ReadingSource::Sensor
    }

    async fn reinitialize(&mut self) -> Result<()> {
        self.logger.info("Restarting light sensor");
        self.init().await
    }

    fn name(&self) -> &'static str {
        "hardware"
    }
}

/// Pseudo-random light source for debug mode and hosts without a sensor
pub struct SimulatedSensor {
    rng: StdRng,
    min_lux: f64,
    max_lux: f64,
}

impl SimulatedSensor {
    pub fn new(min_lux: f64, max_lux: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            min_lux: min_lux.max(0.0),
            max_lux: max_lux.max(min_lux.max(0.0)),
        }
    }

    pub fn from_config(config: &SensorConfig) -> Self {
        Self::new(
            config.simulated_min_lux,
            config.simulated_max_lux,
            config.simulated_seed,
        )
    }
}

#[async_trait::async_trait]
impl LightSource for SimulatedSensor {
    async fn read_lux(&mut self) -> Result<f64> {
        Ok(self.rng.gen_range(self.min_lux..=self.max_lux))
    }

    fn reading_source(&self) -> ReadingSource {
        ReadingSource::Synthetic
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Produces timestamped [`Reading`]s from a light source. No internal retries.
pub struct LightSampler {
    source: Box<dyn LightSource>,
    logger: crate::logging::StructuredLogger,
}

impl LightSampler {
    pub fn with_source(source: Box<dyn LightSource>) -> Self {
        Self {
            source,
            logger: get_logger("sampler"),
        }
    }

    /// Pick the hardware or simulated source from the debug flag.
    ///
    /// A missing hardware device is reported through the first failing
    /// `sample`, so the sampling loop can keep retrying.
    pub async fn from_config(config: &Config) -> Self {
        if config.debug {
            return Self::with_source(Box::new(SimulatedSensor::from_config(&config.sensor)));
        }

        let mut sensor = HardwareSensor::new(&config.sensor);
        let init = sensor.init().await;
        let sampler = Self::with_source(Box::new(sensor));
        if let Err(e) = init {
            sampler
                .logger
                .error(&format!("Light sensor init failed: {}", e));
        }
        sampler
    }

    /// Take one reading, failing with `SensorUnavailable` on hardware errors
    pub async fn sample(&mut self) -> Result<Reading> {
        let lux = self.source.read_lux().await?;
        let reading = Reading::new(Utc::now(), lux, self.source.reading_source())
            .map_err(|_| MonitorError::sensor(format!("implausible lux value {}", lux)))?;
        self.logger
            .trace(&format!("Sampled {:.2} lux from {}", lux, self.source.name()));
        Ok(reading)
    }

    /// Re-initialize the underlying source after a failed sample
    pub async fn recover(&mut self) -> Result<()> {
        self.source.reinitialize().await
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }
}
