use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Europe::London;
use energy_monitor::prices::parse_snapshot;
use energy_monitor::readings::ReadingLog;
use energy_monitor::tariff::{Tariff, TariffConfig};
use energy_monitor::usage::{
    HistoricPrices, PulseMeter, SlotPrices, UsageHistory, UsageSummary, UsageTracker,
    pulses_per_slot,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const FIXTURE_DAY: &str = "2023-10-04";

// Expected figures for the 2023-10-04 fixture at 1005 blinks per kWh and 5% VAT
const PULSES: u64 = 531;
const ENERGY_KWH: f64 = 0.528_358_208_955_223_9;
const COST_POUNDS: f64 = 0.113_750_313_432_835_84;
const AVERAGE_PENCE: f64 = 21.529_014_124_293_788;
const LIVE_WATTS: f64 = 296.525_168_761_710_6;

fn data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("data")
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn fixture_prices() -> SlotPrices {
    let file = std::fs::File::open(data_dir().join("prices/agile/2023-10-04.csv")).unwrap();
    let snapshot = parse_snapshot(file).unwrap();
    SlotPrices::from_snapshot(&snapshot, &London, day(FIXTURE_DAY), 5.0, 28.62)
}

fn agile(offline_file: PathBuf) -> Arc<TariffConfig> {
    Arc::new(TariffConfig {
        tariff: Tariff::Agile,
        electricity_url: "http://127.0.0.1:9/unused".to_string(),
        gas_url: None,
        offline_file,
        vat_percent: 5.0,
        default_unit_price: 28.62,
        offline: false,
    })
}

/// Reading log and price cache laid out in a temp dir, with the fixture day copied in
fn workspace(root: &Path) -> (PathBuf, PathBuf) {
    let readings = root.join("monitor");
    let prices = root.join("prices");
    std::fs::create_dir_all(&readings).unwrap();
    std::fs::create_dir_all(prices.join("agile")).unwrap();
    std::fs::copy(
        data_dir().join("monitor/2023-10-04.csv"),
        readings.join("2023-10-04.csv"),
    )
    .unwrap();
    std::fs::copy(
        data_dir().join("prices/agile/2023-10-04.csv"),
        prices.join("agile/2023-10-04.csv"),
    )
    .unwrap();
    (readings, prices)
}

fn history(readings: &Path, prices: &Path, offline_file: PathBuf) -> UsageHistory {
    UsageHistory::new(
        ReadingLog::new(readings, London),
        readings.join("totals"),
        PulseMeter::new(1005.0),
        HistoricPrices::new(prices, agile(offline_file), London),
    )
}

#[tokio::test]
async fn day_cost_and_power_match_fixture() {
    let log = ReadingLog::new(data_dir().join("monitor"), London);
    let entries = log.read_day(day(FIXTURE_DAY)).await.unwrap();
    let meter = PulseMeter::new(1005.0);

    let counts = pulses_per_slot(&entries, day(FIXTURE_DAY));
    let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
    assert_eq!(counts[&at(7, 0)], 151);
    assert_eq!(counts[&at(11, 30)], 1);
    assert_eq!(counts[&at(18, 0)], 202);
    // Lines carried over from the neighbouring days are not counted
    assert_eq!(counts.values().sum::<u64>(), entries.len() as u64 - 2);

    let usage = meter.day_usage(&entries, &fixture_prices());
    assert_eq!(usage.pulses, PULSES);
    assert!((usage.energy_kwh - ENERGY_KWH).abs() < 1e-9);
    assert!((usage.cost_pounds - COST_POUNDS).abs() < 1e-9);
    assert!((usage.average_pence_per_kwh().unwrap() - AVERAGE_PENCE).abs() < 1e-9);

    assert!((meter.live_power_watts(&entries).unwrap() - LIVE_WATTS).abs() < 1e-6);
}

#[tokio::test]
async fn past_day_totals_are_cached() {
    let dir = tempfile::tempdir().unwrap();
    let (readings, prices) = workspace(dir.path());
    let history = history(&readings, &prices, dir.path().join("missing.csv"));

    let totals = history.totals(day("2023-10-05")).await.unwrap();
    assert_eq!(totals.yesterday.pulses, PULSES);
    assert!((totals.yesterday.cost_pounds - COST_POUNDS).abs() < 1e-9);
    assert_eq!(totals.week, None);
    assert_eq!(totals.month, None);

    let cached = history.totals_path(day(FIXTURE_DAY));
    assert!(cached.exists());

    // The cached total wins over a log file changed afterwards
    std::fs::write(readings.join("2023-10-04.csv"), "").unwrap();
    let again = history.day_total(day(FIXTURE_DAY)).await.unwrap();
    assert_eq!(again, totals.yesterday);
}

#[tokio::test]
async fn week_total_needs_every_day_logged() {
    let dir = tempfile::tempdir().unwrap();
    let (readings, prices) = workspace(dir.path());
    let history = history(&readings, &prices, dir.path().join("missing.csv"));

    for d in ["2023-09-29", "2023-09-30", "2023-10-01", "2023-10-02"] {
        std::fs::write(readings.join(format!("{}.csv", d)), "").unwrap();
    }
    assert_eq!(history.totals(day("2023-10-05")).await.unwrap().week, None);

    for d in ["2023-09-28", "2023-10-03"] {
        std::fs::write(readings.join(format!("{}.csv", d)), "").unwrap();
    }
    let totals = history.totals(day("2023-10-05")).await.unwrap();
    assert_eq!(totals.week, Some(totals.yesterday));
    assert_eq!(totals.month, None);
    // Empty days are not cached
    assert!(!history.totals_path(day("2023-10-01")).exists());
}

#[tokio::test]
async fn days_without_prices_use_the_default() {
    let dir = tempfile::tempdir().unwrap();
    let prices = HistoricPrices::new(dir.path(), agile(dir.path().join("missing.csv")), London);
    let slots = prices.for_day(day("2023-10-04")).await;
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
    assert!((slots.price_for(noon) - 28.62 * 1.05).abs() < 1e-9);

    let shipped = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("data/prices/offline/octopus_go_2023_02_07.csv");
    let mut go = (*agile(shipped)).clone();
    go.tariff = Tariff::Go;
    let prices = HistoricPrices::new(dir.path(), Arc::new(go), London);
    let slots = prices.for_day(day("2023-10-04")).await;
    let night = NaiveTime::from_hms_opt(2, 0, 0).unwrap();
    assert!((slots.price_for(night) - 7.14 * 1.05).abs() < 1e-9);
}

#[tokio::test]
async fn tracker_prices_today_from_the_price_task_when_current() {
    let dir = tempfile::tempdir().unwrap();
    let (readings, prices) = workspace(dir.path());
    let meter = PulseMeter::new(1005.0);
    let mut tracker = UsageTracker::new(
        meter,
        history(&readings, &prices, dir.path().join("missing.csv")),
        London,
    );

    // 23:59:59 BST on the fixture day
    let now = utc("2023-10-04T22:59:59Z");

    let flat = SlotPrices::flat(day(FIXTURE_DAY), 0.0, 20.0);
    let snapshot = tracker.snapshot(now, Some(&flat)).await.unwrap();
    assert_eq!(snapshot.date, day(FIXTURE_DAY));
    assert_eq!(snapshot.today.pulses, PULSES);
    let expected = PULSES as f64 * 20.0 * meter.wh_per_pulse() / 100_000.0;
    assert!((snapshot.today.cost_pounds - expected).abs() < 1e-9);
    assert!((snapshot.power_watts.unwrap() - LIVE_WATTS).abs() < 1e-6);
    assert_eq!(snapshot.rolling.last_60_min.pulses, 34);
    assert!(snapshot.rolling.last_5_min.pulses < 34);
    assert_eq!(snapshot.history.yesterday, UsageSummary::default());

    // Prices for another day are ignored in favour of the cached day
    let stale = SlotPrices::flat(day("2023-10-03"), 0.0, 20.0);
    let snapshot = tracker.snapshot(now, Some(&stale)).await.unwrap();
    assert!((snapshot.today.cost_pounds - COST_POUNDS).abs() < 1e-9);
}
