//! Display output
//!
//! The renderer is external. It receives [`DisplayUpdate`]s through the
//! [`DisplaySink`] trait; the shipped [`LogDisplay`] only logs them.

use crate::config::DisplayConfig;
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::prices::{DataSource, ResolvedPrice};
use crate::sensor::Reading;
use crate::slots::unit_slot_start;
use crate::usage::UsageSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything the screen shows for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayUpdate {
    /// Latest smoothed lux, if any reading has been accepted yet
    pub lux: Option<f64>,
    pub price_inc_vat: f64,
    pub gas_price_inc_vat: Option<f64>,
    pub vat_inclusive: bool,
    pub source: DataSource,
    pub slot_start: DateTime<Utc>,
    /// Power, consumption and cost figures once the usage task has run
    pub usage: Option<UsageSnapshot>,
}

impl DisplayUpdate {
    pub fn new(
        reading: Option<&Reading>,
        price: &ResolvedPrice,
        usage: Option<&UsageSnapshot>,
    ) -> Self {
        Self {
            lux: reading.map(|r| r.lux),
            price_inc_vat: price.current_unit_price_inc_vat,
            gas_price_inc_vat: price.gas_unit_price_inc_vat,
            vat_inclusive: true,
            source: price.source,
            slot_start: unit_slot_start(&price.resolved_at),
            usage: usage.copied(),
        }
    }
}

/// Consumer of display updates
#[async_trait::async_trait]
pub trait DisplaySink: Send {
    async fn show(&mut self, update: &DisplayUpdate) -> Result<()>;
}

/// Sink that writes updates to the log
pub struct LogDisplay {
    width: u32,
    height: u32,
    show_fps: bool,
    frames: u64,
    started: std::time::Instant,
    logger: StructuredLogger,
}

impl LogDisplay {
    pub fn new(config: &DisplayConfig) -> Self {
        let logger = get_logger("display");
        logger.info(&format!(
            "Display {}x{} (fps overlay {})",
            config.width,
            config.height,
            if config.show_fps { "on" } else { "off" }
        ));
        Self {
            width: config.width,
            height: config.height,
            show_fps: config.show_fps,
            frames: 0,
            started: std::time::Instant::now(),
            logger,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[async_trait::async_trait]
impl DisplaySink for LogDisplay {
    async fn show(&mut self, update: &DisplayUpdate) -> Result<()> {
        self.frames += 1;
        let lux = update
            .lux
            .map_or_else(|| "-".to_string(), |l| format!("{:.2}", l));
        let gas = update
            .gas_price_inc_vat
            .map_or_else(String::new, |g| format!(", gas {:.2}p", g));
        let mut line = format!(
            "lux {} | {:.2}p/kWh inc VAT{} [{}]",
            lux, update.price_inc_vat, gas, update.source
        );
        if let Some(usage) = &update.usage {
            let power = usage
                .power_watts
                .map_or_else(|| "-".to_string(), |w| format!("{:.0}", w));
            line.push_str(&format!(
                " | {} W, today {:.3} kWh £{:.2}, yesterday £{:.2}",
                power,
                usage.today.energy_kwh,
                usage.today.cost_pounds,
                usage.history.yesterday.cost_pounds
            ));
        }
        if self.show_fps {
            let secs = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
            line.push_str(&format!(" {:.1} fps", self.frames as f64 / secs));
        }
        self.logger.debug(&line);
        Ok(())
    }
}
