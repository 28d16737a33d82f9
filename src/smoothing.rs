//! Adaptive smoothing of light readings
//!
//! Each raw reading is either suppressed (too close to the last accepted lux),
//! accepted as-is, or accepted together with a bounded run of interpolated
//! readings that bridge a sampling gap much wider than the previous one.

use crate::config::SensorConfig;
use crate::sensor::{Reading, ReadingSource};
use chrono::TimeDelta;
use std::collections::VecDeque;

/// Smoothing constants, copied out of the sensor configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    pub min_lux_difference: f64,
    pub interval_multiplier: f64,
    /// Maximum interpolated readings per gap; 0 disables smoothing
    pub limit: usize,
}

impl SmoothingParams {
    pub fn from_config(config: &SensorConfig) -> Self {
        Self {
            min_lux_difference: config.min_lux_difference_for_reading,
            interval_multiplier: config.smoothing_interval_multiplier,
            limit: config.smoothing_limit,
        }
    }

    pub fn enabled(&self) -> bool {
        self.limit > 0
    }
}

/// Bounded, ordered record of recent inter-reading intervals (oldest first)
#[derive(Debug, Clone)]
pub struct IntervalHistory {
    intervals: VecDeque<TimeDelta>,
    capacity: usize,
}

impl IntervalHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            intervals: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an interval, evicting the oldest beyond capacity
    pub fn push(&mut self, interval: TimeDelta) {
        if self.capacity == 0 {
            return;
        }
        if self.intervals.len() == self.capacity {
            self.intervals.pop_front();
        }
        self.intervals.push_back(interval);
    }

    /// Most recent interval
    pub fn latest(&self) -> Option<TimeDelta> {
        self.intervals.back().copied()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeDelta> {
        self.intervals.iter()
    }
}

/// Result of offering one raw reading to the smoother
#[derive(Debug, Clone, PartialEq)]
pub enum SmootherOutcome {
    /// Change below the minimum lux difference; nothing emitted, no state change
    Suppressed,
    /// Readings to publish in time order; the last one is the raw reading
    Emitted(Vec<Reading>),
}

impl SmootherOutcome {
    /// Emitted readings (empty when suppressed)
    pub fn readings(&self) -> &[Reading] {
        match self {
            Self::Suppressed => &[],
            Self::Emitted(readings) => readings,
        }
    }

    /// Final emitted reading
    pub fn latest(&self) -> Option<&Reading> {
        self.readings().last()
    }

    /// Number of interpolated readings inserted
    pub fn interpolated_count(&self) -> usize {
        self.readings().iter().filter(|r| r.is_interpolated()).count()
    }
}

/// Stateful smoother owned by the sampling task
#[derive(Debug, Clone)]
pub struct AdaptiveSmoother {
    params: SmoothingParams,
    last: Option<Reading>,
    history: IntervalHistory,
}

impl AdaptiveSmoother {
    pub fn new(params: SmoothingParams) -> Self {
        Self {
            params,
            last: None,
            history: IntervalHistory::new(params.limit),
        }
    }

    /// Offer a raw reading.
    ///
    /// The interval compared against is the most recent one in the history,
    /// so the first two accepted readings are never smoothed.
    pub fn push(&mut self, reading: Reading) -> SmootherOutcome {
        let Some(last) = self.last else {
            self.last = Some(reading);
            return SmootherOutcome::Emitted(vec![reading]);
        };

        if (reading.lux - last.lux).abs() < self.params.min_lux_difference {
            return SmootherOutcome::Suppressed;
        }

        let current_interval = reading.timestamp - last.timestamp;
        let mut emitted = self.interpolate(&last, &reading, current_interval);
        emitted.push(reading);

        self.history.push(current_interval);
        self.last = Some(reading);
        SmootherOutcome::Emitted(emitted)
    }

    /// Interpolated readings strictly between `from` and `to`, possibly none
    fn interpolate(&self, from: &Reading, to: &Reading, current: TimeDelta) -> Vec<Reading> {
        if !self.params.enabled() {
            return Vec::new();
        }
        let Some(previous) = self.history.latest() else {
            return Vec::new();
        };

        let current_secs = seconds(current);
        let previous_secs = seconds(previous);
        if previous_secs <= 0.0 || current_secs <= previous_secs * self.params.interval_multiplier
        {
            return Vec::new();
        }

        // One reading per missed interval, capped at the limit
        let segments = (current_secs / previous_secs).round() as usize;
        let count = segments.saturating_sub(1).min(self.params.limit);
        if count == 0 {
            return Vec::new();
        }

        let step_micros = current.num_microseconds().unwrap_or(i64::MAX) / (count as i64 + 1);
        if step_micros <= 0 {
            return Vec::new();
        }

        (1..=count)
            .map(|i| {
                let fraction = i as f64 / (count + 1) as f64;
                Reading {
                    timestamp: from.timestamp + TimeDelta::microseconds(step_micros * i as i64),
                    lux: from.lux + (to.lux - from.lux) * fraction,
                    source: ReadingSource::Interpolated,
                }
            })
            .collect()
    }

    pub fn last_reading(&self) -> Option<&Reading> {
        self.last.as_ref()
    }

    pub fn last_interval(&self) -> Option<TimeDelta> {
        self.history.latest()
    }

    pub fn history(&self) -> &IntervalHistory {
        &self.history
    }

    pub fn params(&self) -> SmoothingParams {
        self.params
    }
}

fn seconds(delta: TimeDelta) -> f64 {
    delta
        .num_microseconds()
        .map_or(delta.num_milliseconds() as f64 / 1_000.0, |us| us as f64 / 1_000_000.0)
}
