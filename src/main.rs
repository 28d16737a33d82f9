use anyhow::{Context, Result};
use energy_monitor::logging::{get_logger, init_logging};
use energy_monitor::{Config, EnergyMonitor, TariffSelector};

#[tokio::main]
async fn main() -> Result<()> {
    // Optional config path as first argument, default search paths otherwise
    let mut config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;

    init_logging(&config.logging).context("Failed to initialize logging")?;
    let logger = get_logger("main");

    // Unknown tariffs are fatal before anything starts
    let tariff = TariffSelector::new(&config.tariff)
        .resolve_configured()
        .context("Failed to resolve tariff")?;

    logger.info(&format!(
        "Energy monitor {} starting (tariff {}, {} sensor)",
        env!("APP_VERSION"),
        tariff.tariff,
        if config.debug { "simulated" } else { "hardware" }
    ));
    if !config.tariff.has_credentials() {
        logger.info("No Octopus API key configured, consumption data disabled");
    }

    let monitor = EnergyMonitor::new(config, tariff);
    if let Err(e) = monitor.run().await {
        logger.error(&format!("Monitor failed: {}", e));
        return Err(anyhow::anyhow!("Monitor error: {}", e));
    }
    Ok(())
}
