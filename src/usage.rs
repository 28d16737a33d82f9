//! Energy usage and cost from the reading log
//!
//! Every logged reading is one pulse of the meter's consumption LED. Pulses
//! are counted per half-hour slot and priced at that slot's VAT-inclusive
//! unit rate. Past days are priced from local data only and their totals are
//! cached next to the reading log.

use crate::config::Config;
use crate::error::{MonitorError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::prices::{DailyPriceCache, PriceSeries, Snapshot, apply_vat, read_snapshot};
use crate::readings::{LogEntry, ReadingLog};
use crate::tariff::TariffConfig;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Add;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const WEEK_DAYS: u64 = 7;
const MONTH_DAYS: u64 = 31;

/// Rolling windows, in minutes
const ROLLING_WINDOWS: [i64; 3] = [5, 30, 60];

/// Energy and cost over a run of pulses
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub pulses: u64,
    pub energy_kwh: f64,
    /// Pounds, VAT included
    pub cost_pounds: f64,
}

impl UsageSummary {
    /// Mean price paid in pence per kWh
    pub fn average_pence_per_kwh(&self) -> Option<f64> {
        (self.energy_kwh > 0.0).then(|| self.cost_pounds * 100.0 / self.energy_kwh)
    }
}

impl Add for UsageSummary {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            pulses: self.pulses + other.pulses,
            energy_kwh: self.energy_kwh + other.energy_kwh,
            cost_pounds: self.cost_pounds + other.cost_pounds,
        }
    }
}

/// VAT-inclusive unit price (p/kWh) of every slot of one local day
#[derive(Debug, Clone, PartialEq)]
pub struct SlotPrices {
    date: NaiveDate,
    inc_vat: BTreeMap<NaiveTime, f64>,
    fallback_inc_vat: f64,
}

impl SlotPrices {
    /// Sample `series` at each slot of `date`. Uncovered slots are charged
    /// the default price.
    pub fn from_series(
        series: &PriceSeries,
        tz: &Tz,
        date: NaiveDate,
        vat_percent: f64,
        default_exc_vat: f64,
    ) -> Self {
        let snapshot = Snapshot::from_series(series, tz, date);
        Self {
            date,
            inc_vat: snapshot
                .iter()
                .map(|(time, price)| (time, apply_vat(price, vat_percent)))
                .collect(),
            fallback_inc_vat: apply_vat(default_exc_vat, vat_percent),
        }
    }

    /// Price a day from a time-of-day snapshot
    pub fn from_snapshot(
        snapshot: &Snapshot,
        tz: &Tz,
        date: NaiveDate,
        vat_percent: f64,
        default_exc_vat: f64,
    ) -> Self {
        let series = snapshot.project(tz, date);
        Self::from_series(&series, tz, date, vat_percent, default_exc_vat)
    }

    /// Every slot at the default price
    pub fn flat(date: NaiveDate, vat_percent: f64, default_exc_vat: f64) -> Self {
        Self {
            date,
            inc_vat: BTreeMap::new(),
            fallback_inc_vat: apply_vat(default_exc_vat, vat_percent),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn price_for(&self, slot: NaiveTime) -> f64 {
        self.inc_vat
            .get(&slot)
            .copied()
            .unwrap_or(self.fallback_inc_vat)
    }
}

/// Pulses per slot start, counting only entries whose slot lies on `date`
pub fn pulses_per_slot<'a, I>(entries: I, date: NaiveDate) -> BTreeMap<NaiveTime, u64>
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let mut counts = BTreeMap::new();
    for entry in entries {
        if entry.slot_start.date() == date {
            *counts.entry(entry.slot_start.time()).or_insert(0) += 1;
        }
    }
    counts
}

/// Converts logged pulses to energy, power and cost
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseMeter {
    wh_per_pulse: f64,
}

impl PulseMeter {
    pub fn new(blinks_per_kwh: f64) -> Self {
        Self {
            wh_per_pulse: 1000.0 / blinks_per_kwh,
        }
    }

    pub fn wh_per_pulse(&self) -> f64 {
        self.wh_per_pulse
    }

    pub fn summarize(&self, counts: &BTreeMap<NaiveTime, u64>, prices: &SlotPrices) -> UsageSummary {
        let pulses: u64 = counts.values().sum();
        let cost_pounds = counts
            .iter()
            .map(|(slot, n)| *n as f64 * prices.price_for(*slot) * self.wh_per_pulse)
            .sum::<f64>()
            / 100_000.0;
        UsageSummary {
            pulses,
            energy_kwh: pulses as f64 * self.wh_per_pulse / 1000.0,
            cost_pounds,
        }
    }

    /// Usage on the priced day. Fewer than two log lines count as nothing.
    pub fn day_usage(&self, entries: &[LogEntry], prices: &SlotPrices) -> UsageSummary {
        if entries.len() < 2 {
            return UsageSummary::default();
        }
        self.summarize(&pulses_per_slot(entries, prices.date()), prices)
    }

    /// Usage from entries logged strictly after `after_epoch`
    pub fn usage_since(
        &self,
        entries: &[LogEntry],
        after_epoch: f64,
        prices: &SlotPrices,
    ) -> UsageSummary {
        let recent: Vec<&LogEntry> = entries
            .iter()
            .filter(|e| e.epoch_secs > after_epoch)
            .collect();
        if recent.len() < 2 {
            return UsageSummary::default();
        }
        self.summarize(&pulses_per_slot(recent, prices.date()), prices)
    }

    /// Instant power from the gap between the last two pulses
    pub fn live_power_watts(&self, entries: &[LogEntry]) -> Option<f64> {
        let [.., prev, last] = entries else {
            return None;
        };
        let gap = last.epoch_secs - prev.epoch_secs;
        (gap > 0.0).then(|| 3600.0 * self.wh_per_pulse / gap)
    }

    pub fn rolling(&self, entries: &[LogEntry], now: DateTime<Utc>, prices: &SlotPrices) -> RollingUsage {
        let now_epoch = now.timestamp_micros() as f64 / 1_000_000.0;
        let [five, thirty, sixty] = ROLLING_WINDOWS
            .map(|minutes| self.usage_since(entries, now_epoch - (minutes * 60) as f64, prices));
        RollingUsage {
            last_5_min: five,
            last_30_min: thirty,
            last_60_min: sixty,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RollingUsage {
    pub last_5_min: UsageSummary,
    pub last_30_min: UsageSummary,
    pub last_60_min: UsageSummary,
}

/// Totals of completed days. Week and month are only present when every
/// day in the span has a log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HistoryTotals {
    pub yesterday: UsageSummary,
    pub week: Option<UsageSummary>,
    pub month: Option<UsageSummary>,
}

/// Everything known about consumption at one moment
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub date: NaiveDate,
    pub power_watts: Option<f64>,
    pub today: UsageSummary,
    pub rolling: RollingUsage,
    pub history: HistoryTotals,
}

/// Slot prices for days the price task is not tracking.
///
/// Uses the daily price cache when it holds a complete day, else the
/// tariff's offline snapshot, else the default price. Never touches the
/// network.
pub struct HistoricPrices {
    cache: DailyPriceCache,
    tariff: Arc<TariffConfig>,
    tz: Tz,
    logger: StructuredLogger,
}

impl HistoricPrices {
    pub fn new<P: AsRef<Path>>(prices_directory: P, tariff: Arc<TariffConfig>, tz: Tz) -> Self {
        Self {
            cache: DailyPriceCache::new(prices_directory, tz),
            tariff,
            tz,
            logger: get_logger("historic_prices"),
        }
    }

    pub async fn for_day(&self, date: NaiveDate) -> SlotPrices {
        let vat = self.tariff.vat_percent;
        let default = self.tariff.default_unit_price;

        if let Some(series) = self.cache.load(self.tariff.tariff, date).await {
            return SlotPrices::from_series(&series, &self.tz, date, vat, default);
        }
        match read_snapshot(&self.tariff.offline_file).await {
            Ok(snapshot) => SlotPrices::from_snapshot(&snapshot, &self.tz, date, vat, default),
            Err(e) => {
                self.logger.warn(&format!(
                    "No prices for {}, using default: {}",
                    date, e
                ));
                SlotPrices::flat(date, vat, default)
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TotalRecord {
    date: NaiveDate,
    pulses: u64,
    energy_kwh: f64,
    cost_pounds: f64,
}

/// Per-day totals of past days, cached as `<totals_dir>/<YYYY-MM-DD>.csv`
pub struct UsageHistory {
    log: ReadingLog,
    totals_dir: PathBuf,
    meter: PulseMeter,
    prices: HistoricPrices,
    logger: StructuredLogger,
}

impl UsageHistory {
    pub fn new<P: AsRef<Path>>(
        log: ReadingLog,
        totals_dir: P,
        meter: PulseMeter,
        prices: HistoricPrices,
    ) -> Self {
        Self {
            log,
            totals_dir: totals_dir.as_ref().to_path_buf(),
            meter,
            prices,
            logger: get_logger("usage_history"),
        }
    }

    pub fn log(&self) -> &ReadingLog {
        &self.log
    }

    pub fn prices(&self) -> &HistoricPrices {
        &self.prices
    }

    pub fn totals_path(&self, date: NaiveDate) -> PathBuf {
        self.totals_dir
            .join(format!("{}.csv", date.format("%Y-%m-%d")))
    }

    /// Total for one past day, from the totals cache when present
    pub async fn day_total(&self, date: NaiveDate) -> Result<UsageSummary> {
        if let Some(total) = self.read_total(date).await? {
            return Ok(total);
        }

        let entries = self.log.read_day(date).await?;
        let prices = self.prices.for_day(date).await;
        let total = self.meter.day_usage(&entries, &prices);

        if !entries.is_empty()
            && let Err(e) = self.write_total(date, &total).await
        {
            self.logger
                .warn(&format!("Failed to cache usage total for {}: {}", date, e));
        }
        Ok(total)
    }

    /// Yesterday, last 7 days and last 31 days before `today`
    pub async fn totals(&self, today: NaiveDate) -> Result<HistoryTotals> {
        let yesterday = match today.pred_opt() {
            Some(date) => self.day_total(date).await?,
            None => UsageSummary::default(),
        };
        Ok(HistoryTotals {
            yesterday,
            week: self.span_total(today, WEEK_DAYS).await?,
            month: self.span_total(today, MONTH_DAYS).await?,
        })
    }

    async fn span_total(&self, today: NaiveDate, days: u64) -> Result<Option<UsageSummary>> {
        let mut dates = Vec::new();
        for back in 1..=days {
            let Some(date) = today.checked_sub_days(Days::new(back)) else {
                return Ok(None);
            };
            if !self.log.has_day(date).await {
                return Ok(None);
            }
            dates.push(date);
        }

        let mut total = UsageSummary::default();
        for date in dates {
            total = total + self.day_total(date).await?;
        }
        Ok(Some(total))
    }

    async fn read_total(&self, date: NaiveDate) -> Result<Option<UsageSummary>> {
        let bytes = match tokio::fs::read(self.totals_path(date)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        match reader.deserialize::<TotalRecord>().next() {
            Some(Ok(record)) => Ok(Some(UsageSummary {
                pulses: record.pulses,
                energy_kwh: record.energy_kwh,
                cost_pounds: record.cost_pounds,
            })),
            Some(Err(e)) => {
                self.logger
                    .warn(&format!("Ignoring unreadable usage total for {}: {}", date, e));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn write_total(&self, date: NaiveDate, total: &UsageSummary) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(TotalRecord {
            date,
            pulses: total.pulses,
            energy_kwh: total.energy_kwh,
            cost_pounds: total.cost_pounds,
        })?;
        let data = writer
            .into_inner()
            .map_err(|e| MonitorError::io(e.to_string()))?;
        tokio::fs::create_dir_all(&self.totals_dir).await?;
        tokio::fs::write(self.totals_path(date), data).await?;
        Ok(())
    }
}

/// Builds [`UsageSnapshot`]s from today's log file and cached history
pub struct UsageTracker {
    meter: PulseMeter,
    history: UsageHistory,
    tz: Tz,
    cached_history: Option<(NaiveDate, HistoryTotals)>,
}

impl UsageTracker {
    pub fn new(meter: PulseMeter, history: UsageHistory, tz: Tz) -> Self {
        Self {
            meter,
            history,
            tz,
            cached_history: None,
        }
    }

    pub fn from_config(config: &Config, tariff: Arc<TariffConfig>, tz: Tz) -> Self {
        let meter = PulseMeter::new(config.readings.blinks_per_kwh);
        let prices = HistoricPrices::new(&config.tariff.prices_directory, tariff, tz);
        let history = UsageHistory::new(
            ReadingLog::new(&config.readings.directory, tz),
            config.readings.totals_directory(),
            meter,
            prices,
        );
        Self::new(meter, history, tz)
    }

    /// Usage as of `now`. `today_prices` is used when it covers today's
    /// date; otherwise today is priced from local data.
    pub async fn snapshot(
        &mut self,
        now: DateTime<Utc>,
        today_prices: Option<&SlotPrices>,
    ) -> Result<UsageSnapshot> {
        let today = now.with_timezone(&self.tz).date_naive();
        let prices = match today_prices.filter(|p| p.date() == today) {
            Some(prices) => prices.clone(),
            None => self.history.prices().for_day(today).await,
        };

        let history = match self.cached_history {
            Some((date, totals)) if date == today => totals,
            _ => {
                let totals = self.history.totals(today).await?;
                self.cached_history = Some((today, totals));
                totals
            }
        };

        let entries = self.history.log().read_day(today).await?;
        Ok(UsageSnapshot {
            date: today,
            power_watts: self.meter.live_power_watts(&entries),
            today: self.meter.day_usage(&entries, &prices),
            rolling: self.meter.rolling(&entries, now, &prices),
            history,
        })
    }
}
