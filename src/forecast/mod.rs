pub mod batch;
pub mod bmkg;
pub mod fallback;
pub mod types;

use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use types::BmkgResponse;

pub use batch::{batch_fetch, batch_fetch_with_progress, BatchProgress, BatchSummary};
pub use bmkg::{BmkgClient, BmkgError};
pub use types::{CurrentWeather, ForecastWeather, Sourced, WeatherResponse, WeatherSource};

/// Raw provider payloads keyed by region code.
pub type WeatherCache = Cache<String, Arc<BmkgResponse>>;

pub fn init_cache(ttl: Duration) -> WeatherCache {
    Cache::builder().time_to_live(ttl).build()
}
