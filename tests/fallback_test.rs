use chrono::{DateTime, Utc};
use chrono_tz::Europe::London;
use energy_monitor::error::{MonitorError, Result};
use energy_monitor::prices::{
    DataSource, FallbackPolicy, FallbackState, PricePoint, PriceSeries, PriceSource, PriceWindow,
    TariffPrices, read_snapshot,
};
use energy_monitor::tariff::{Tariff, TariffConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

const GO_PROFILE: &str = "Date,Time,Price\n\
    2023-02-07,00:00,36.19\n\
    2023-02-07,00:30,7.14\n\
    2023-02-07,04:30,36.19\n";

enum Live {
    Fails(fn() -> MonitorError),
    Flat(f64),
}

/// Live behaviour is scripted; offline reads the real snapshot file
struct ScriptedSource {
    live: Live,
    live_calls: AtomicUsize,
    offline_calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(live: Live) -> Self {
        Self {
            live,
            live_calls: AtomicUsize::new(0),
            offline_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl PriceSource for ScriptedSource {
    async fn fetch_live(&self, _config: &TariffConfig, window: &PriceWindow) -> Result<TariffPrices> {
        self.live_calls.fetch_add(1, Ordering::SeqCst);
        match &self.live {
            Live::Fails(err) => Err(err()),
            Live::Flat(price) => Ok(TariffPrices::electricity_only(PriceSeries::from_points(
                vec![PricePoint {
                    valid_from: window.start,
                    valid_to: window.end,
                    unit_price_exc_vat: *price,
                }],
            ))),
        }
    }

    async fn fetch_offline(
        &self,
        config: &TariffConfig,
        window: &PriceWindow,
    ) -> Result<TariffPrices> {
        self.offline_calls.fetch_add(1, Ordering::SeqCst);
        let snapshot = read_snapshot(&config.offline_file).await?;
        Ok(TariffPrices::electricity_only(
            snapshot.project(&London, window.date),
        ))
    }
}

fn tariff(offline_file: PathBuf, vat_percent: f64) -> TariffConfig {
    TariffConfig {
        tariff: Tariff::Go,
        electricity_url: "http://127.0.0.1:9/unused".to_string(),
        gas_url: None,
        offline_file,
        vat_percent,
        default_unit_price: 28.62,
        offline: false,
    }
}

fn write_profile(dir: &Path) -> PathBuf {
    let path = dir.join("octopus_go_2023_02_07.csv");
    std::fs::write(&path, GO_PROFILE).unwrap();
    path
}

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

#[tokio::test]
async fn network_error_falls_back_to_offline_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = tariff(write_profile(dir.path()), 5.0);
    let source = ScriptedSource::new(Live::Fails(|| MonitorError::network("connection refused")));
    let mut policy = FallbackPolicy::new(false, London);

    // 02:00 GMT falls in the cheap window
    let resolved = policy.resolve(&source, &config, utc("2023-12-01T02:00:00Z")).await;

    assert_eq!(resolved.source, DataSource::Offline);
    assert!((resolved.current_unit_price_inc_vat - 7.14 * 1.05).abs() < 1e-9);
    assert_eq!(policy.state(), FallbackState::OfflineFallback);
    assert_eq!(source.live_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.offline_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn auth_error_also_falls_back_to_offline() {
    let dir = tempfile::tempdir().unwrap();
    let config = tariff(write_profile(dir.path()), 5.0);
    let source = ScriptedSource::new(Live::Fails(|| MonitorError::auth("401 Unauthorized")));
    let mut policy = FallbackPolicy::new(false, London);

    let resolved = policy.resolve(&source, &config, utc("2023-12-01T12:00:00Z")).await;
    assert_eq!(resolved.source, DataSource::Offline);
    assert!((resolved.current_unit_price_inc_vat - 36.19 * 1.05).abs() < 1e-9);
}

#[tokio::test]
async fn missing_snapshot_falls_back_to_default_price() {
    let dir = tempfile::tempdir().unwrap();
    let config = tariff(dir.path().join("missing.csv"), 5.0);
    let source = ScriptedSource::new(Live::Fails(|| MonitorError::network("dns failure")));
    let mut policy = FallbackPolicy::new(false, London);

    let resolved = policy.resolve(&source, &config, utc("2023-12-01T02:00:00Z")).await;

    assert_eq!(resolved.source, DataSource::Default);
    assert!((resolved.current_unit_price_inc_vat - 28.62 * (1.0 + 5.0 / 100.0)).abs() < 1e-9);
    assert_eq!(policy.state(), FallbackState::DefaultPrice);
    assert_eq!(source.live_calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.offline_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_snapshot_falls_back_to_default_price() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.csv");
    std::fs::write(&path, "Date,Time\n2023-02-07,00:00\n").unwrap();
    let config = tariff(path, 20.0);
    let source = ScriptedSource::new(Live::Fails(|| MonitorError::timeout("5s elapsed")));
    let mut policy = FallbackPolicy::new(false, London);

    let resolved = policy.resolve(&source, &config, utc("2023-12-01T02:00:00Z")).await;
    assert_eq!(resolved.source, DataSource::Default);
    assert!((resolved.current_unit_price_inc_vat - 28.62 * 1.2).abs() < 1e-9);
}

#[tokio::test]
async fn each_cycle_restarts_from_live() {
    let dir = tempfile::tempdir().unwrap();
    let config = tariff(dir.path().join("missing.csv"), 5.0);
    let mut policy = FallbackPolicy::new(false, London);
    let at = utc("2023-12-01T02:00:00Z");

    let failing = ScriptedSource::new(Live::Fails(|| MonitorError::network("down")));
    assert_eq!(policy.resolve(&failing, &config, at).await.source, DataSource::Default);

    let healthy = ScriptedSource::new(Live::Flat(20.0));
    let resolved = policy.resolve(&healthy, &config, at).await;
    assert_eq!(resolved.source, DataSource::Live);
    assert!((resolved.current_unit_price_inc_vat - 21.0).abs() < 1e-9);
    assert_eq!(policy.state(), FallbackState::Live);
    assert_eq!(healthy.offline_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn vat_change_rescales_without_compounding() {
    let healthy = ScriptedSource::new(Live::Flat(20.0));
    let mut policy = FallbackPolicy::new(false, London);
    let at = utc("2023-12-01T02:00:00Z");

    let mut config = tariff(PathBuf::from("unused.csv"), 5.0);
    let first = policy.resolve(&healthy, &config, at).await;
    config.vat_percent = 20.0;
    let second = policy.resolve(&healthy, &config, at).await;
    config.vat_percent = 5.0;
    let third = policy.resolve(&healthy, &config, at).await;

    assert!((first.current_unit_price_inc_vat - 21.0).abs() < 1e-9);
    assert!((second.current_unit_price_inc_vat - 24.0).abs() < 1e-9);
    assert!((third.current_unit_price_inc_vat - first.current_unit_price_inc_vat).abs() < 1e-12);
}

#[tokio::test]
async fn offline_policy_never_calls_live() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tariff(write_profile(dir.path()), 5.0);
    config.offline = true;
    let source = ScriptedSource::new(Live::Flat(99.0));
    let mut policy = FallbackPolicy::new(true, London);

    assert_eq!(policy.initial_state(), FallbackState::OfflineFallback);
    let resolved = policy.resolve(&source, &config, utc("2023-12-01T02:00:00Z")).await;
    assert_eq!(resolved.source, DataSource::Offline);
    assert_eq!(source.live_calls.load(Ordering::SeqCst), 0);
}
