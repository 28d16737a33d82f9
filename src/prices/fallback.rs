//! Price fallback policy
//!
//! Each resolution cycle walks at most three states: a single live attempt,
//! a single offline snapshot read, then the configured default price. The
//! walk always starts again from the configured starting state, so one bad
//! cycle does not pin the monitor to stale prices once the API recovers.

use super::fetcher::{PriceSource, PriceWindow};
use super::types::{DataSource, PriceSeries, ResolvedPrice, TariffPrices};
use crate::error::{MonitorError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::tariff::TariffConfig;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    Live,
    OfflineFallback,
    DefaultPrice,
}

pub struct FallbackPolicy {
    initial: FallbackState,
    state: FallbackState,
    tz: Tz,
    last_source: Option<DataSource>,
    day_prices: Option<PriceSeries>,
    logger: StructuredLogger,
}

impl FallbackPolicy {
    /// Start in `Live` unless the tariff is configured offline
    pub fn new(offline: bool, tz: Tz) -> Self {
        let initial = if offline {
            FallbackState::OfflineFallback
        } else {
            FallbackState::Live
        };
        Self {
            initial,
            state: initial,
            tz,
            last_source: None,
            day_prices: None,
            logger: get_logger("fallback"),
        }
    }

    pub fn initial_state(&self) -> FallbackState {
        self.initial
    }

    /// State that produced the most recent resolution
    pub fn state(&self) -> FallbackState {
        self.state
    }

    /// Electricity series behind the most recent resolution; `None` when it
    /// came from the default price
    pub fn day_prices(&self) -> Option<&PriceSeries> {
        self.day_prices.as_ref()
    }

    /// Resolve the price in effect at `at`. Never fails.
    pub async fn resolve<S>(
        &mut self,
        source: &S,
        config: &TariffConfig,
        at: DateTime<Utc>,
    ) -> ResolvedPrice
    where
        S: PriceSource + ?Sized,
    {
        self.state = self.initial;
        self.day_prices = None;

        let resolved = match PriceWindow::local_day(&self.tz, at) {
            Ok(window) => self.walk(source, config, &window, at).await,
            Err(e) => {
                self.logger
                    .error(&format!("Cannot build price window for {}: {}", at, e));
                self.state = FallbackState::DefaultPrice;
                None
            }
        };

        let resolved = resolved.unwrap_or_else(|| {
            ResolvedPrice::default_price(config.default_unit_price, config.vat_percent, at)
        });

        if self.last_source != Some(resolved.source) {
            self.logger.info(&format!(
                "Price source now {} ({:.2}p/kWh inc VAT)",
                resolved.source, resolved.current_unit_price_inc_vat
            ));
            self.last_source = Some(resolved.source);
        }
        resolved
    }

    async fn walk<S>(
        &mut self,
        source: &S,
        config: &TariffConfig,
        window: &PriceWindow,
        at: DateTime<Utc>,
    ) -> Option<ResolvedPrice>
    where
        S: PriceSource + ?Sized,
    {
        if self.state == FallbackState::Live {
            let live = source
                .fetch_live(config, window)
                .await
                .and_then(|prices| price_at(prices, config, at, DataSource::Live));
            match live {
                Ok((resolved, series)) => {
                    self.day_prices = Some(series);
                    return Some(resolved);
                }
                Err(e) => {
                    if e.is_retryable_remote() {
                        self.logger
                            .warn(&format!("Live prices unavailable: {}", e));
                    } else {
                        self.logger.error(&format!("Live price fetch failed: {}", e));
                    }
                    self.state = FallbackState::OfflineFallback;
                }
            }
        }

        if self.state == FallbackState::OfflineFallback {
            let offline = source
                .fetch_offline(config, window)
                .await
                .and_then(|prices| price_at(prices, config, at, DataSource::Offline));
            match offline {
                Ok((resolved, series)) => {
                    self.day_prices = Some(series);
                    return Some(resolved);
                }
                Err(e) => {
                    self.logger
                        .error(&format!("Offline prices unavailable: {}", e));
                    self.state = FallbackState::DefaultPrice;
                }
            }
        }

        None
    }
}

fn price_at(
    prices: TariffPrices,
    config: &TariffConfig,
    at: DateTime<Utc>,
    tag: DataSource,
) -> Result<(ResolvedPrice, PriceSeries)> {
    let resolved =
        ResolvedPrice::from_prices(&prices, at, config.vat_percent, tag).ok_or_else(|| match tag {
            DataSource::Offline => {
                MonitorError::malformed(format!("no offline price covers {}", at))
            }
            _ => MonitorError::network(format!("no {} price covers {}", tag, at)),
        })?;
    Ok((resolved, prices.electricity))
}
