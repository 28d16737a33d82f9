//! Live and offline price fetching, normalized to one local day

use super::cache::DailyPriceCache;
use super::client::{ConsumptionInterval, OctopusClient, UnitRate};
use super::offline::read_snapshot;
use super::types::{PricePoint, PriceSeries, TariffPrices};
use crate::config::TariffSettings;
use crate::error::{MonitorError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::slots::local_day_bounds;
use crate::tariff::{Tariff, TariffConfig};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Local calendar day being priced, with its UTC bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PriceWindow {
    /// The local day containing `at`
    pub fn local_day(tz: &Tz, at: DateTime<Utc>) -> Result<Self> {
        let date = at.with_timezone(tz).date_naive();
        let (start, end) = local_day_bounds(tz, date).ok_or_else(|| {
            MonitorError::validation("date", format!("no local midnight on {}", date).as_str())
        })?;
        Ok(Self { date, start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Source of raw (exclusive of VAT) tariff prices
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    /// Prices from the remote API
    async fn fetch_live(&self, config: &TariffConfig, window: &PriceWindow) -> Result<TariffPrices>;

    /// Prices from the tariff's offline snapshot; never touches the network
    async fn fetch_offline(
        &self,
        config: &TariffConfig,
        window: &PriceWindow,
    ) -> Result<TariffPrices>;

    /// Metered electricity consumption, when the source can provide it
    async fn fetch_consumption(
        &self,
        _window: &PriceWindow,
    ) -> Result<Option<Vec<ConsumptionInterval>>> {
        Ok(None)
    }
}

/// Turn API unit rates into a clipped, non-overlapping series for `window`.
///
/// Open-ended rates run to the window end. FLEXIBLE results for other
/// payment methods than direct debit are ignored.
pub fn normalize_rates(tariff: Tariff, rates: &[UnitRate], window: &PriceWindow) -> PriceSeries {
    let points = rates
        .iter()
        .filter(|r| {
            tariff != Tariff::Flexible
                || r.payment_method
                    .as_deref()
                    .is_none_or(|m| m.eq_ignore_ascii_case("DIRECT_DEBIT"))
        })
        .filter_map(|r| {
            let from = r.valid_from.unwrap_or(window.start).max(window.start);
            let to = r.valid_to.unwrap_or(window.end).min(window.end);
            (from < to).then_some(PricePoint {
                valid_from: from,
                valid_to: to,
                unit_price_exc_vat: r.value_exc_vat,
            })
        })
        .collect();
    PriceSeries::from_points(points)
}

/// Fetches tariff prices from the Octopus API or the offline snapshots
pub struct PriceFetcher {
    client: OctopusClient,
    cache: DailyPriceCache,
    usage_url: Option<String>,
    tz: Tz,
    logger: StructuredLogger,
}

impl PriceFetcher {
    pub fn new(settings: &TariffSettings) -> Result<Self> {
        let tz = settings.tz()?;
        Ok(Self {
            client: OctopusClient::new(settings)?,
            cache: DailyPriceCache::new(&settings.prices_directory, tz),
            usage_url: settings
                .electricity_usage_url
                .clone()
                .filter(|u| !u.trim().is_empty()),
            tz,
            logger: get_logger_with_context(
                LogContext::new("price_fetcher").with_tariff(&settings.name.to_uppercase()),
            ),
        })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Raw prices for the local day containing `at`.
    ///
    /// With `offline` set only the snapshot is read.
    pub async fn fetch(
        &self,
        config: &TariffConfig,
        offline: bool,
        at: DateTime<Utc>,
    ) -> Result<TariffPrices> {
        let window = PriceWindow::local_day(&self.tz, at)?;
        if offline {
            self.fetch_offline(config, &window).await
        } else {
            self.fetch_live(config, &window).await
        }
    }

    async fn live_electricity(
        &self,
        config: &TariffConfig,
        window: &PriceWindow,
    ) -> Result<PriceSeries> {
        if let Some(cached) = self.cache.load(config.tariff, window.date).await {
            return Ok(cached);
        }

        let rates = self
            .client
            .fetch_unit_rates(&config.electricity_url, window.start, window.end)
            .await?;
        let series = normalize_rates(config.tariff, &rates, window);
        if series.is_empty() {
            return Err(MonitorError::network(format!(
                "no electricity rates returned for {}",
                window.date
            )));
        }

        self.cache.store(config.tariff, window.date, &series).await;
        Ok(series)
    }
}

#[async_trait::async_trait]
impl PriceSource for PriceFetcher {
    async fn fetch_live(&self, config: &TariffConfig, window: &PriceWindow) -> Result<TariffPrices> {
        let electricity = self.live_electricity(config, window).await?;

        // Gas is optional; its failure does not invalidate electricity prices
        let gas = match &config.gas_url {
            Some(url) => match self.client.fetch_unit_rates(url, window.start, window.end).await {
                Ok(rates) => Some(normalize_rates(config.tariff, &rates, window))
                    .filter(|s| !s.is_empty()),
                Err(e) => {
                    self.logger.warn(&format!("Gas price fetch failed: {}", e));
                    None
                }
            },
            None => None,
        };

        self.logger.debug(&format!(
            "Live prices for {}: {} electricity points, gas {}",
            window.date,
            electricity.len(),
            gas.as_ref().map_or(0, |g| g.len())
        ));
        Ok(TariffPrices { electricity, gas })
    }

    async fn fetch_offline(
        &self,
        config: &TariffConfig,
        window: &PriceWindow,
    ) -> Result<TariffPrices> {
        self.logger.debug(&format!(
            "Using offline prices from {}",
            config.offline_file.display()
        ));
        let snapshot = read_snapshot(&config.offline_file).await?;
        Ok(TariffPrices::electricity_only(
            snapshot.project(&self.tz, window.date),
        ))
    }

    /// `None` without an API key or usage URL
    async fn fetch_consumption(
        &self,
        window: &PriceWindow,
    ) -> Result<Option<Vec<ConsumptionInterval>>> {
        let Some(url) = &self.usage_url else {
            return Ok(None);
        };
        self.client
            .fetch_consumption(url, window.start, window.end)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::London;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn rate(value: f64, from: Option<&str>, to: Option<&str>, method: Option<&str>) -> UnitRate {
        UnitRate {
            value_exc_vat: value,
            value_inc_vat: None,
            valid_from: from.map(utc),
            valid_to: to.map(utc),
            payment_method: method.map(str::to_string),
        }
    }

    fn window() -> PriceWindow {
        PriceWindow::local_day(&London, utc("2023-10-05T12:00:00Z")).unwrap()
    }

    #[test]
    fn window_covers_local_day() {
        let w = window();
        assert_eq!(w.start, utc("2023-10-04T23:00:00Z"));
        assert_eq!(w.end, utc("2023-10-05T23:00:00Z"));
        assert!(w.contains(utc("2023-10-05T22:59:59Z")));
        assert!(!w.contains(w.end));
    }

    #[test]
    fn tracker_daily_rate_is_clipped_to_window() {
        let rates = [rate(
            20.0,
            Some("2023-10-04T23:00:00Z"),
            Some("2023-10-05T23:00:00Z"),
            None,
        )];
        let series = normalize_rates(Tariff::Tracker, &rates, &window());
        assert_eq!(series.len(), 1);
        assert!(series.price_at(utc("2023-10-05T18:00:00Z")).is_some());
    }

    #[test]
    fn flexible_keeps_direct_debit_and_open_ended() {
        let rates = [
            rate(30.0, Some("2023-04-01T00:00:00Z"), None, Some("NON_DIRECT_DEBIT")),
            rate(25.0, Some("2023-04-01T00:00:00Z"), None, Some("DIRECT_DEBIT")),
        ];
        let w = window();
        let series = normalize_rates(Tariff::Flexible, &rates, &w);
        assert_eq!(series.len(), 1);
        let point = series.points()[0];
        assert_eq!(point.valid_from, w.start);
        assert_eq!(point.valid_to, w.end);
        assert!((point.unit_price_exc_vat - 25.0).abs() < 1e-9);
    }

    #[test]
    fn overlapping_go_rates_prefer_later_start() {
        // API lists newest first
        let rates = [
            rate(40.0, Some("2023-10-05T03:30:00Z"), None, None),
            rate(8.0, Some("2023-10-04T23:30:00Z"), Some("2023-10-05T03:30:00Z"), None),
            rate(40.0, Some("2023-10-04T20:00:00Z"), None, None),
        ];
        let series = normalize_rates(Tariff::Go, &rates, &window());
        assert_eq!(series.len(), 3);
        let at = |s| series.price_at(utc(s)).unwrap().unit_price_exc_vat;
        assert!((at("2023-10-04T23:10:00Z") - 40.0).abs() < 1e-9);
        assert!((at("2023-10-05T01:00:00Z") - 8.0).abs() < 1e-9);
        assert!((at("2023-10-05T12:00:00Z") - 40.0).abs() < 1e-9);
    }
}
