//! Offline price snapshots
//!
//! A snapshot is a `Date,Time,Price` CSV holding one price (p/kWh, exclusive
//! of VAT) per half-hour slot start. It is treated as a time-of-day profile:
//! the `Date` column is informational and rows are projected onto whatever
//! local date is being priced.

use super::types::{PricePoint, PriceSeries};
use crate::error::{MonitorError, Result};
use crate::slots::{day_slot_times, local_to_utc};
use chrono::{NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize)]
struct SnapshotRecord {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Price")]
    price: f64,
}

/// Parsed snapshot: slot start time to price, in time order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    prices: BTreeMap<NaiveTime, f64>,
}

impl Snapshot {
    pub fn from_prices(prices: BTreeMap<NaiveTime, f64>) -> Self {
        Self { prices }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn price_for(&self, time: NaiveTime) -> Option<f64> {
        self.prices.get(&time).copied()
    }

    /// Slot start and price pairs in time order
    pub fn iter(&self) -> impl Iterator<Item = (NaiveTime, f64)> + '_ {
        self.prices.iter().map(|(time, price)| (*time, *price))
    }

    /// Project the profile onto a local date.
    ///
    /// Each row is valid until the next row's time; the last runs to local
    /// midnight. Wall-clock times skipped by DST are dropped.
    pub fn project<Z: TimeZone>(&self, tz: &Z, date: NaiveDate) -> PriceSeries {
        let Some(next_day) = date.succ_opt() else {
            return PriceSeries::default();
        };
        let midnight = local_to_utc(tz, next_day.and_time(NaiveTime::MIN));

        let starts: Vec<_> = self
            .prices
            .iter()
            .filter_map(|(time, price)| {
                local_to_utc(tz, date.and_time(*time)).map(|from| (from, *price))
            })
            .collect();

        let points = starts
            .iter()
            .enumerate()
            .filter_map(|(i, (from, price))| {
                let to = starts.get(i + 1).map(|(next, _)| *next).or(midnight)?;
                Some(PricePoint {
                    valid_from: *from,
                    valid_to: to,
                    unit_price_exc_vat: *price,
                })
            })
            .collect();

        PriceSeries::from_points(points)
    }

    /// Sample a series at every slot start of a local date
    pub fn from_series<Z: TimeZone>(series: &PriceSeries, tz: &Z, date: NaiveDate) -> Self {
        let prices = day_slot_times()
            .filter_map(|time| {
                let at = local_to_utc(tz, date.and_time(time))?;
                series
                    .price_at(at)
                    .map(|p| (time, p.unit_price_exc_vat))
            })
            .collect();
        Self { prices }
    }
}

/// Parse snapshot CSV data.
///
/// Later rows for the same time replace earlier ones. An empty snapshot is
/// malformed.
pub fn parse_snapshot<R: Read>(reader: R) -> Result<Snapshot> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut prices = BTreeMap::new();
    for (line, record) in csv_reader.deserialize::<SnapshotRecord>().enumerate() {
        let record = record?;
        let time = parse_slot_time(&record.time).ok_or_else(|| {
            MonitorError::malformed(format!(
                "row {}: invalid time '{}'",
                line + 2,
                record.time
            ))
        })?;
        if !record.price.is_finite() {
            return Err(MonitorError::malformed(format!(
                "row {}: non-finite price",
                line + 2
            )));
        }
        prices.insert(time, record.price);
    }

    if prices.is_empty() {
        return Err(MonitorError::malformed("snapshot has no price rows"));
    }
    Ok(Snapshot { prices })
}

/// Read and parse a snapshot file
pub async fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MonitorError::offline_missing(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    parse_snapshot(bytes.as_slice()).map_err(|e| match e {
        MonitorError::MalformedOfflineData { message } => {
            MonitorError::malformed(format!("{}: {}", path.display(), message))
        }
        other => other,
    })
}

/// Write a snapshot for `date`, creating parent directories
pub async fn write_snapshot(path: &Path, date: NaiveDate, snapshot: &Snapshot) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let date = date.format("%Y-%m-%d").to_string();
    for (time, price) in &snapshot.prices {
        writer.serialize(SnapshotRecord {
            date: date.clone(),
            time: time.format("%H:%M").to_string(),
            price: *price,
        })?;
    }
    let data = writer
        .into_inner()
        .map_err(|e| MonitorError::io(e.to_string()))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await?;
    Ok(())
}

fn parse_slot_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}
