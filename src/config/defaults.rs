use super::*;

const OCTOPUS_PRODUCTS: &str = "https://api.octopus.energy/v1/products";

fn octopus_rates(product: &str, fuel: &str, prefix: &str) -> String {
    format!(
        "{}/{}/{}-tariffs/{}-1R-{}-C/standard-unit-rates/",
        OCTOPUS_PRODUCTS, product, fuel, prefix, product
    )
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            device_path: "/sys/bus/iio/devices/iio:device0".to_string(),
            light_integration_time_ms: 50,
            light_repeat_rate_ms: 50,
            sleep_time_between_readings_ms: 50,
            min_lux_difference_for_reading: 0.01,
            smoothing_interval_multiplier: 2.0,
            smoothing_limit: 3,
            simulated_min_lux: 0.0,
            simulated_max_lux: 400.0,
            simulated_seed: None,
        }
    }
}

impl Default for TariffSettings {
    fn default() -> Self {
        Self {
            name: "AGILE".to_string(),
            offline: false,
            vat_percent: 5.0,
            default_unit_price: 28.62,
            api_key: String::new(),
            api_pass: String::new(),
            electricity_usage_url: None,
            prices_directory: "data/prices".to_string(),
            timezone: "Europe/London".to_string(),
            request_timeout_secs: 5,
            max_pages: 10,
            price_refresh_interval_secs: 1800,
            agile: TariffSourceConfig {
                electricity_url: octopus_rates("AGILE-18-02-21", "electricity", "E"),
                gas_url: None,
                offline_file: "octopus_agile_2023_02_07.csv".to_string(),
            },
            flexible: TariffSourceConfig {
                electricity_url: octopus_rates("VAR-22-11-01", "electricity", "E"),
                gas_url: Some(octopus_rates("VAR-22-11-01", "gas", "G")),
                offline_file: "octopus_flexible_2023_02_07.csv".to_string(),
            },
            go: TariffSourceConfig {
                electricity_url: octopus_rates("GO-21-05-13", "electricity", "E"),
                gas_url: None,
                offline_file: "octopus_go_2023_02_07.csv".to_string(),
            },
            tracker: TariffSourceConfig {
                electricity_url: octopus_rates("SILVER-FLEX-22-11-25", "electricity", "E"),
                gas_url: Some(octopus_rates("SILVER-FLEX-22-11-25", "gas", "G")),
                offline_file: "octopus_tracker_2023_02_07.csv".to_string(),
            },
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 480,
            show_fps: false,
        }
    }
}

impl Default for ReadingsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: "data/monitor".to_string(),
            blinks_per_kwh: 1005.0,
            usage_refresh_interval_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "data/logs/energy_monitor.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            sensor: SensorConfig::default(),
            tariff: TariffSettings::default(),
            display: DisplayConfig::default(),
            readings: ReadingsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
