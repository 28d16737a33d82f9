//! Monitor runtime
//!
//! Tasks share nothing mutable. The sampling task owns the light sampler,
//! the smoother and the reading log; the price task owns the price source and
//! the fallback policy; the usage task turns the reading log into power and
//! cost. Each publishes its latest output on a `watch` channel and the
//! display task combines them into [`DisplayUpdate`]s. Sampling never waits
//! on network I/O.

use crate::config::Config;
use crate::display::{DisplaySink, DisplayUpdate, LogDisplay};
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger, get_logger_with_context};
use crate::prices::{FallbackPolicy, PriceFetcher, PriceSource, PriceWindow, ResolvedPrice};
use crate::readings::ReadingLog;
use crate::sensor::{LightSampler, Reading};
use crate::slots::next_slot_boundary;
use crate::smoothing::{AdaptiveSmoother, SmootherOutcome, SmoothingParams};
use crate::tariff::TariffConfig;
use crate::usage::{SlotPrices, UsageSnapshot, UsageTracker};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, sleep};

/// Delay after a slot boundary before refreshing, so the new slot's rate applies
const BOUNDARY_GRACE: Duration = Duration::from_secs(1);

/// Log files checked for corrupt lines at startup
const REPAIR_RECENT_FILES: usize = 2;

/// Time until the next price refresh: just past the next half-hour boundary,
/// but never longer than `max`
pub fn next_refresh_delay(now: DateTime<Utc>, max: Duration) -> Duration {
    let until_boundary = (next_slot_boundary(now) - now)
        .to_std()
        .unwrap_or(Duration::ZERO);
    (until_boundary + BOUNDARY_GRACE).min(max)
}

/// Owns the sampler, smoother and reading log
pub struct SamplingTask {
    sampler: LightSampler,
    smoother: AdaptiveSmoother,
    log: Option<ReadingLog>,
    tick: Duration,
    readings: watch::Sender<Option<Reading>>,
    logger: StructuredLogger,
}

impl SamplingTask {
    pub fn new(
        sampler: LightSampler,
        smoother: AdaptiveSmoother,
        log: Option<ReadingLog>,
        tick: Duration,
        readings: watch::Sender<Option<Reading>>,
    ) -> Self {
        Self {
            sampler,
            smoother,
            log,
            tick,
            readings,
            logger: get_logger("sampling"),
        }
    }

    /// One sampling tick. Sensor errors skip the tick and re-initialize the
    /// source.
    pub async fn step(&mut self) -> SmootherOutcome {
        let reading = match self.sampler.sample().await {
            Ok(reading) => reading,
            Err(e) => {
                self.logger.error(&format!("Sampling failed: {}", e));
                if let Err(e) = self.sampler.recover().await {
                    self.logger
                        .warn(&format!("Sensor re-initialization failed: {}", e));
                }
                return SmootherOutcome::Suppressed;
            }
        };

        let outcome = self.smoother.push(reading);
        if let SmootherOutcome::Emitted(readings) = &outcome {
            if outcome.interpolated_count() > 0 {
                self.logger.debug(&format!(
                    "Inserted {} smoothed readings",
                    outcome.interpolated_count()
                ));
            }
            if let Some(log) = &mut self.log
                && let Err(e) = log.append(readings).await
            {
                self.logger
                    .warn(&format!("Failed to write reading log: {}", e));
            }
            self.readings.send_replace(outcome.latest().copied());
        }
        outcome
    }

    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        self.logger.info(&format!(
            "Sampling every {:?} from {} sensor",
            self.tick,
            self.sampler.source_name()
        ));
        loop {
            self.step().await;
            tokio::select! {
                _ = sleep(self.tick) => {}
                _ = stop.changed() => break,
            }
        }
        self.logger.debug("Sampling stopped");
    }
}

/// Owns the price source and fallback policy
pub struct PriceTask {
    source: Box<dyn PriceSource>,
    policy: FallbackPolicy,
    tariff: Arc<TariffConfig>,
    tz: Tz,
    max_refresh: Duration,
    prices: watch::Sender<Option<ResolvedPrice>>,
    slot_prices: Option<watch::Sender<Option<SlotPrices>>>,
    logger: StructuredLogger,
}

impl PriceTask {
    pub fn new(
        source: Box<dyn PriceSource>,
        tariff: Arc<TariffConfig>,
        tz: Tz,
        max_refresh: Duration,
        prices: watch::Sender<Option<ResolvedPrice>>,
    ) -> Self {
        Self {
            source,
            policy: FallbackPolicy::new(tariff.offline, tz),
            logger: get_logger_with_context(
                LogContext::new("prices").with_tariff(tariff.tariff.as_str()),
            ),
            tariff,
            tz,
            max_refresh,
            prices,
            slot_prices: None,
        }
    }

    /// Also publish the VAT-inclusive price of every slot of the day
    pub fn with_slot_prices(mut self, tx: watch::Sender<Option<SlotPrices>>) -> Self {
        self.slot_prices = Some(tx);
        self
    }

    fn day_slot_prices(&self, at: DateTime<Utc>) -> SlotPrices {
        let date = at.with_timezone(&self.tz).date_naive();
        let vat = self.tariff.vat_percent;
        let default = self.tariff.default_unit_price;
        match self.policy.day_prices() {
            Some(series) => SlotPrices::from_series(series, &self.tz, date, vat, default),
            None => SlotPrices::flat(date, vat, default),
        }
    }

    /// Resolve and publish the price in effect at `at`
    pub async fn refresh(&mut self, at: DateTime<Utc>) -> ResolvedPrice {
        let resolved = self
            .policy
            .resolve(self.source.as_ref(), &self.tariff, at)
            .await;
        self.prices.send_replace(Some(resolved));
        if let Some(tx) = &self.slot_prices {
            tx.send_replace(Some(self.day_slot_prices(at)));
        }

        if !self.tariff.offline {
            self.log_consumption(at).await;
        }
        resolved
    }

    async fn log_consumption(&self, at: DateTime<Utc>) {
        let Ok(window) = PriceWindow::local_day(&self.tz, at) else {
            return;
        };
        match self.source.fetch_consumption(&window).await {
            Ok(Some(intervals)) => {
                let kwh: f64 = intervals.iter().map(|i| i.consumption).sum();
                self.logger.info(&format!(
                    "Metered consumption for {}: {:.3} kWh over {} intervals",
                    window.date,
                    kwh,
                    intervals.len()
                ));
            }
            Ok(None) => {}
            Err(e) => self
                .logger
                .warn(&format!("Consumption fetch failed: {}", e)),
        }
    }

    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        loop {
            let now = Utc::now();
            self.refresh(now).await;
            let delay = next_refresh_delay(now, self.max_refresh);
            self.logger
                .debug(&format!("Next price refresh in {:?}", delay));
            tokio::select! {
                _ = sleep(delay) => {}
                _ = stop.changed() => break,
            }
        }
        self.logger.debug("Price refresh stopped");
    }
}

/// Recomputes power, consumption and cost from the reading log
pub struct UsageTask {
    tracker: UsageTracker,
    interval: Duration,
    prices: watch::Receiver<Option<SlotPrices>>,
    usage: watch::Sender<Option<UsageSnapshot>>,
    logger: StructuredLogger,
}

impl UsageTask {
    pub fn new(
        tracker: UsageTracker,
        interval: Duration,
        prices: watch::Receiver<Option<SlotPrices>>,
        usage: watch::Sender<Option<UsageSnapshot>>,
    ) -> Self {
        Self {
            tracker,
            interval,
            prices,
            usage,
            logger: get_logger("usage"),
        }
    }

    /// Recompute and publish usage as of `now`. On failure the previous
    /// snapshot stays published.
    pub async fn refresh(&mut self, now: DateTime<Utc>) -> Option<UsageSnapshot> {
        let prices = self.prices.borrow().clone();
        match self.tracker.snapshot(now, prices.as_ref()).await {
            Ok(snapshot) => {
                self.usage.send_replace(Some(snapshot));
                Some(snapshot)
            }
            Err(e) => {
                self.logger.warn(&format!("Usage calculation failed: {}", e));
                None
            }
        }
    }

    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        loop {
            self.refresh(Utc::now()).await;
            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = stop.changed() => break,
            }
        }
        self.logger.debug("Usage tracking stopped");
    }
}

/// Forward combined updates to the display sink whenever an input changes
pub async fn run_display(
    mut sink: Box<dyn DisplaySink>,
    mut readings: watch::Receiver<Option<Reading>>,
    mut prices: watch::Receiver<Option<ResolvedPrice>>,
    mut usage: watch::Receiver<Option<UsageSnapshot>>,
    mut stop: watch::Receiver<bool>,
) {
    let logger = get_logger("display");
    // Usage is optional; its channel closing does not end the display
    let mut usage_open = true;
    loop {
        tokio::select! {
            changed = readings.changed() => if changed.is_err() { break },
            changed = prices.changed() => if changed.is_err() { break },
            changed = usage.changed(), if usage_open => {
                if changed.is_err() {
                    usage_open = false;
                    continue;
                }
            }
            _ = stop.changed() => break,
        }

        let reading = *readings.borrow_and_update();
        let price = *prices.borrow_and_update();
        let snapshot = *usage.borrow_and_update();
        if let Some(price) = price
            && let Err(e) = sink
                .show(&DisplayUpdate::new(reading.as_ref(), &price, snapshot.as_ref()))
                .await
        {
            logger.warn(&format!("Display update failed: {}", e));
        }
    }
}

/// Handle used to stop a running monitor
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ShutdownHandle {
    pub fn request_shutdown(&self) {
        self.tx.send(()).ok();
    }
}

/// Top-level runtime wiring the tasks together
pub struct EnergyMonitor {
    config: Config,
    tariff: Arc<TariffConfig>,
    shutdown_tx: mpsc::UnboundedSender<()>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,
    logger: StructuredLogger,
}

impl EnergyMonitor {
    pub fn new(config: Config, tariff: TariffConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        Self {
            config,
            tariff: Arc::new(tariff),
            shutdown_tx,
            shutdown_rx,
            logger: get_logger("monitor"),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Build the production components and run until shutdown
    pub async fn run(self) -> Result<()> {
        let sampler = LightSampler::from_config(&self.config).await;
        let fetcher = PriceFetcher::new(&self.config.tariff)?;
        let sink = LogDisplay::new(&self.config.display);
        self.run_with(sampler, Box::new(fetcher), Box::new(sink))
            .await
    }

    /// Run with explicit components until shutdown or Ctrl-C
    pub async fn run_with(
        mut self,
        sampler: LightSampler,
        source: Box<dyn PriceSource>,
        sink: Box<dyn DisplaySink>,
    ) -> Result<()> {
        let tz = self.config.tariff.tz()?;
        let log = if self.config.readings.enabled {
            let log = ReadingLog::new(&self.config.readings.directory, tz);
            if let Err(e) = log.repair_recent(REPAIR_RECENT_FILES).await {
                self.logger
                    .warn(&format!("Reading log repair failed: {}", e));
            }
            Some(log)
        } else {
            None
        };

        let usage_enabled = log.is_some();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (reading_tx, reading_rx) = watch::channel(None);
        let (price_tx, price_rx) = watch::channel(None);
        let (slot_price_tx, slot_price_rx) = watch::channel(None);
        let (usage_tx, usage_rx) = watch::channel(None);

        let sampling = SamplingTask::new(
            sampler,
            AdaptiveSmoother::new(SmoothingParams::from_config(&self.config.sensor)),
            log,
            Duration::from_millis(self.config.sensor.sleep_time_between_readings_ms),
            reading_tx,
        );
        let pricing = PriceTask::new(
            source,
            Arc::clone(&self.tariff),
            tz,
            Duration::from_secs(self.config.tariff.price_refresh_interval_secs),
            price_tx,
        )
        .with_slot_prices(slot_price_tx);

        self.logger.info(&format!(
            "Monitoring {} tariff ({})",
            self.tariff.tariff,
            if self.tariff.offline { "offline" } else { "live" }
        ));

        let mut tasks = vec![
            tokio::spawn(sampling.run(stop_rx.clone())),
            tokio::spawn(pricing.run(stop_rx.clone())),
        ];
        if usage_enabled {
            let usage = UsageTask::new(
                UsageTracker::from_config(&self.config, Arc::clone(&self.tariff), tz),
                Duration::from_secs(self.config.readings.usage_refresh_interval_secs),
                slot_price_rx,
                usage_tx,
            );
            tasks.push(tokio::spawn(usage.run(stop_rx.clone())));
        } else {
            drop(usage_tx);
        }
        tasks.push(tokio::spawn(run_display(
            sink, reading_rx, price_rx, usage_rx, stop_rx,
        )));

        tokio::select! {
            _ = self.shutdown_rx.recv() => {
                self.logger.info("Shutdown signal received");
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    self.logger.error(&format!("Failed to listen for Ctrl-C: {}", e));
                }
                self.logger.info("Interrupted, shutting down");
            }
        }

        stop_tx.send_replace(true);
        for task in tasks {
            if let Err(e) = task.await {
                self.logger.error(&format!("Task ended abnormally: {}", e));
            }
        }
        self.logger.info("Monitor shutdown complete");
        Ok(())
    }
}
