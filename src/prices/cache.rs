//! Daily on-disk cache of live electricity prices

use super::offline::{Snapshot, read_snapshot, write_snapshot};
use super::types::PriceSeries;
use crate::logging::{StructuredLogger, get_logger};
use crate::slots::SLOTS_PER_DAY;
use crate::tariff::Tariff;
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::path::{Path, PathBuf};

/// Per-day on-disk copy of live electricity prices, exclusive of VAT.
///
/// Files live at `<root>/<tariff>/<YYYY-MM-DD>.csv` in the snapshot format.
pub struct DailyPriceCache {
    root: PathBuf,
    tz: Tz,
    logger: StructuredLogger,
}

impl DailyPriceCache {
    pub fn new<P: AsRef<Path>>(root: P, tz: Tz) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            tz,
            logger: get_logger("price_cache"),
        }
    }

    pub fn path_for(&self, tariff: Tariff, date: NaiveDate) -> PathBuf {
        self.root
            .join(tariff.key())
            .join(format!("{}.csv", date.format("%Y-%m-%d")))
    }

    /// Cached series for a day, only if every slot is present
    pub async fn load(&self, tariff: Tariff, date: NaiveDate) -> Option<PriceSeries> {
        let path = self.path_for(tariff, date);
        match read_snapshot(&path).await {
            Ok(snapshot) if snapshot.len() == SLOTS_PER_DAY => {
                self.logger
                    .debug(&format!("Using cached prices from {}", path.display()));
                Some(snapshot.project(&self.tz, date))
            }
            Ok(snapshot) => {
                self.logger.debug(&format!(
                    "Ignoring incomplete cache {} ({} slots)",
                    path.display(),
                    snapshot.len()
                ));
                None
            }
            Err(_) => None,
        }
    }

    /// Store a live series. Failures are logged only.
    pub async fn store(&self, tariff: Tariff, date: NaiveDate, series: &PriceSeries) {
        let path = self.path_for(tariff, date);
        let snapshot = Snapshot::from_series(series, &self.tz, date);
        if snapshot.is_empty() {
            return;
        }
        if let Err(e) = write_snapshot(&path, date, &snapshot).await {
            self.logger.warn(&format!(
                "Failed to write price cache {}: {}",
                path.display(),
                e
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::types::PricePoint;
    use crate::slots::local_day_bounds;
    use chrono::TimeDelta;
    use chrono_tz::Europe::London;

    fn flat_day(date: NaiveDate, price: f64) -> PriceSeries {
        let (start, _) = local_day_bounds(&London, date).unwrap();
        let points = (0..SLOTS_PER_DAY as i64)
            .map(|i| PricePoint {
                valid_from: start + TimeDelta::minutes(30 * i),
                valid_to: start + TimeDelta::minutes(30 * (i + 1)),
                unit_price_exc_vat: price + i as f64,
            })
            .collect();
        PriceSeries::from_points(points)
    }

    #[tokio::test]
    async fn complete_day_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DailyPriceCache::new(dir.path(), London);
        let date = NaiveDate::from_ymd_opt(2023, 10, 5).unwrap();
        let series = flat_day(date, 10.0);

        assert!(cache.load(Tariff::Agile, date).await.is_none());
        cache.store(Tariff::Agile, date, &series).await;
        assert!(dir.path().join("agile").join("2023-10-05.csv").exists());
        assert_eq!(cache.load(Tariff::Agile, date).await, Some(series));
    }

    #[tokio::test]
    async fn partial_day_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DailyPriceCache::new(dir.path(), London);
        let date = NaiveDate::from_ymd_opt(2023, 10, 5).unwrap();
        let path = cache.path_for(Tariff::Go, date);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "Date,Time,Price\n2023-10-05,00:00,9.5\n").unwrap();

        assert!(cache.load(Tariff::Go, date).await.is_none());
    }
}
