//! Octopus Energy unit price resolution
//!
//! Prices are fetched from the Octopus REST API (or an offline CSV snapshot),
//! kept exclusive of VAT, and resolved to a VAT-inclusive price for one
//! instant by the [`FallbackPolicy`].

pub mod cache;
pub mod client;
pub mod fallback;
pub mod fetcher;
pub mod offline;
pub mod types;

pub use cache::DailyPriceCache;
pub use client::{ConsumptionInterval, OctopusClient, Page, UnitRate};
pub use fallback::{FallbackPolicy, FallbackState};
pub use fetcher::{PriceFetcher, PriceSource, PriceWindow, normalize_rates};
pub use offline::{Snapshot, parse_snapshot, read_snapshot, write_snapshot};
pub use types::{DataSource, PricePoint, PriceSeries, ResolvedPrice, TariffPrices, apply_vat};
