//! Octopus Energy REST client: paginated unit rates and metered consumption

use crate::config::TariffSettings;
use crate::error::{MonitorError, Result};
use crate::logging::{StructuredLogger, get_logger};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// One page of an Octopus list endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// Entry of a `standard-unit-rates` result list
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnitRate {
    pub value_exc_vat: f64,
    #[serde(default)]
    pub value_inc_vat: Option<f64>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// Entry of a meter consumption result list
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsumptionInterval {
    /// kWh used in the interval
    pub consumption: f64,
    pub interval_start: DateTime<Utc>,
    pub interval_end: DateTime<Utc>,
}

/// Minimal Octopus Energy REST client
pub struct OctopusClient {
    http: reqwest::Client,
    api_key: Option<String>,
    api_pass: String,
    max_pages: u32,
    logger: StructuredLogger,
}

impl OctopusClient {
    /// Build a client with the configured timeout and credentials
    pub fn new(settings: &TariffSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: Some(settings.api_key.trim().to_string()).filter(|k| !k.is_empty()),
            api_pass: settings.api_pass.clone(),
            max_pages: settings.max_pages.max(1),
            logger: get_logger("octopus"),
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetch unit rates for `[period_from, period_to)`, following pagination
    pub async fn fetch_unit_rates(
        &self,
        url: &str,
        period_from: DateTime<Utc>,
        period_to: DateTime<Utc>,
    ) -> Result<Vec<UnitRate>> {
        self.fetch_all(url, period_from, period_to).await
    }

    /// Fetch half-hourly consumption.
    ///
    /// The endpoint needs an API key; without one this returns `Ok(None)`
    /// and makes no request.
    pub async fn fetch_consumption(
        &self,
        url: &str,
        period_from: DateTime<Utc>,
        period_to: DateTime<Utc>,
    ) -> Result<Option<Vec<ConsumptionInterval>>> {
        if self.api_key.is_none() {
            self.logger
                .debug("No API key configured, skipping consumption fetch");
            return Ok(None);
        }
        self.fetch_all(url, period_from, period_to).await.map(Some)
    }

    async fn fetch_all<T: DeserializeOwned>(
        &self,
        url: &str,
        period_from: DateTime<Utc>,
        period_to: DateTime<Utc>,
    ) -> Result<Vec<T>> {
        let mut results = Vec::new();
        let mut page_url = url.to_string();
        let mut first = true;
        let mut pages = 0u32;

        loop {
            let page: Page<T> = self
                .get_page(&page_url, first.then_some((period_from, period_to)))
                .await?;
            pages += 1;
            first = false;

            self.logger.debug(&format!(
                "Fetched page {} from {} ({} results, count={:?})",
                pages,
                url,
                page.results.len(),
                page.count
            ));
            results.extend(page.results);

            match page.next.filter(|n| !n.trim().is_empty()) {
                Some(next) if pages < self.max_pages => page_url = next,
                Some(_) => {
                    self.logger.warn(&format!(
                        "Stopped after {} pages from {}, more results remain",
                        pages, url
                    ));
                    break;
                }
                None => break,
            }
        }

        Ok(results)
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
        period: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Page<T>> {
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("energy-monitor/", env!("CARGO_PKG_VERSION")));

        // `next` links already carry the query string
        if let Some((from, to)) = period {
            request = request.query(&[
                ("period_from", from.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("period_to", to.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ]);
        }
        if let Some(key) = &self.api_key {
            request = request.basic_auth(key, Some(&self.api_pass));
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(MonitorError::auth(format!("{} returned {}", url, status)));
        }
        if !status.is_success() {
            return Err(MonitorError::network(format!(
                "{} returned {}",
                url, status
            )));
        }

        let body = resp.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| MonitorError::network(format!("unexpected response from {}: {}", url, e)))
    }
}
