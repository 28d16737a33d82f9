//! Price series and resolved prices

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Apply VAT to an exclusive-of-VAT unit price
pub fn apply_vat(price_exc_vat: f64, vat_percent: f64) -> f64 {
    price_exc_vat * (1.0 + vat_percent / 100.0)
}

/// One unit rate valid over `[valid_from, valid_to)`, exclusive of VAT
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePoint {
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    /// Pence per kWh, exclusive of VAT
    pub unit_price_exc_vat: f64,
}

impl PricePoint {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && at < self.valid_to
    }

    pub fn inc_vat(&self, vat_percent: f64) -> f64 {
        apply_vat(self.unit_price_exc_vat, vat_percent)
    }
}

/// Time-ordered, non-overlapping run of price points
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Normalize arbitrary points into a series.
    ///
    /// Empty or non-finite points are dropped. Where windows overlap the later
    /// starting rate wins and the earlier one is cut short.
    pub fn from_points(mut points: Vec<PricePoint>) -> Self {
        points.retain(|p| p.valid_from < p.valid_to && p.unit_price_exc_vat.is_finite());
        points.sort_by_key(|p| p.valid_from);
        points.dedup_by_key(|p| p.valid_from);

        for i in 1..points.len() {
            let next_start = points[i].valid_from;
            if points[i - 1].valid_to > next_start {
                points[i - 1].valid_to = next_start;
            }
        }
        points.retain(|p| p.valid_from < p.valid_to);

        Self { points }
    }

    /// The point covering `at`, if any
    pub fn price_at(&self, at: DateTime<Utc>) -> Option<&PricePoint> {
        let idx = self.points.partition_point(|p| p.valid_from <= at);
        idx.checked_sub(1)
            .and_then(|i| self.points.get(i))
            .filter(|p| p.contains(at))
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Raw price data for one tariff, as fetched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TariffPrices {
    pub electricity: PriceSeries,
    pub gas: Option<PriceSeries>,
}

impl TariffPrices {
    pub fn electricity_only(electricity: PriceSeries) -> Self {
        Self {
            electricity,
            gas: None,
        }
    }
}

/// Where a resolved price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Offline,
    Default,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Offline => "offline",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price in effect at one instant, VAT included. Recomputed every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedPrice {
    pub current_unit_price_inc_vat: f64,
    pub gas_unit_price_inc_vat: Option<f64>,
    pub source: DataSource,
    pub vat_percent: f64,
    /// Validity of the underlying rate; `None` for the default price
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedPrice {
    /// Resolve the rate in effect at `at` from raw prices.
    ///
    /// VAT is applied here, once, so the same raw prices can be re-resolved
    /// under a different VAT rate.
    pub fn from_prices(
        prices: &TariffPrices,
        at: DateTime<Utc>,
        vat_percent: f64,
        source: DataSource,
    ) -> Option<Self> {
        let point = prices.electricity.price_at(at)?;
        let gas = prices
            .gas
            .as_ref()
            .and_then(|g| g.price_at(at))
            .map(|p| p.inc_vat(vat_percent));
        Some(Self {
            current_unit_price_inc_vat: point.inc_vat(vat_percent),
            gas_unit_price_inc_vat: gas,
            source,
            vat_percent,
            valid_from: Some(point.valid_from),
            valid_to: Some(point.valid_to),
            resolved_at: at,
        })
    }

    /// Constant fallback price
    pub fn default_price(default_exc_vat: f64, vat_percent: f64, at: DateTime<Utc>) -> Self {
        Self {
            current_unit_price_inc_vat: apply_vat(default_exc_vat, vat_percent),
            gas_unit_price_inc_vat: None,
            source: DataSource::Default,
            vat_percent,
            valid_from: None,
            valid_to: None,
            resolved_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn point(from: &str, minutes: i64, price: f64) -> PricePoint {
        let valid_from = utc(from);
        PricePoint {
            valid_from,
            valid_to: valid_from + TimeDelta::minutes(minutes),
            unit_price_exc_vat: price,
        }
    }

    #[test]
    fn series_is_sorted_and_trimmed() {
        let series = PriceSeries::from_points(vec![
            point("2023-10-05T01:00:00Z", 30, 3.0),
            point("2023-10-05T00:00:00Z", 90, 1.0),
            point("2023-10-05T00:30:00Z", 30, 2.0),
            point("2023-10-05T02:00:00Z", 0, 9.0),
        ]);

        let starts: Vec<_> = series.points().iter().map(|p| p.unit_price_exc_vat).collect();
        assert_eq!(starts, vec![1.0, 2.0, 3.0]);
        for pair in series.points().windows(2) {
            assert!(pair[0].valid_to <= pair[1].valid_from);
        }
        assert_eq!(series.points()[0].valid_to, utc("2023-10-05T00:30:00Z"));
    }

    #[test]
    fn price_at_respects_half_open_windows() {
        let series = PriceSeries::from_points(vec![
            point("2023-10-05T00:00:00Z", 30, 1.0),
            point("2023-10-05T01:00:00Z", 30, 2.0),
        ]);
        assert_eq!(
            series.price_at(utc("2023-10-05T00:29:59Z")).map(|p| p.unit_price_exc_vat),
            Some(1.0)
        );
        assert!(series.price_at(utc("2023-10-05T00:30:00Z")).is_none());
        assert!(series.price_at(utc("2023-10-04T23:59:00Z")).is_none());
        assert_eq!(
            series.price_at(utc("2023-10-05T01:00:00Z")).map(|p| p.unit_price_exc_vat),
            Some(2.0)
        );
    }

    #[test]
    fn vat_is_applied_once_per_resolution() {
        let prices = TariffPrices::electricity_only(PriceSeries::from_points(vec![point(
            "2023-10-05T00:00:00Z",
            30,
            20.0,
        )]));
        let at = utc("2023-10-05T00:10:00Z");

        let five = ResolvedPrice::from_prices(&prices, at, 5.0, DataSource::Live).unwrap();
        let twenty = ResolvedPrice::from_prices(&prices, at, 20.0, DataSource::Live).unwrap();
        let five_again = ResolvedPrice::from_prices(&prices, at, 5.0, DataSource::Live).unwrap();

        assert!((five.current_unit_price_inc_vat - 21.0).abs() < 1e-9);
        assert!((twenty.current_unit_price_inc_vat - 24.0).abs() < 1e-9);
        assert_eq!(five, five_again);
        assert!((prices.electricity.points()[0].unit_price_exc_vat - 20.0).abs() < 1e-9);
    }

    #[test]
    fn default_price_includes_vat() {
        let at = utc("2023-10-05T00:10:00Z");
        let resolved = ResolvedPrice::default_price(28.62, 5.0, at);
        assert_eq!(resolved.source, DataSource::Default);
        assert!((resolved.current_unit_price_inc_vat - 28.62 * 1.05).abs() < 1e-9);
        assert_eq!(DataSource::Offline.to_string(), "offline");
    }
}
