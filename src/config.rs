use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub bmkg_base_url: String,
    pub region_api_base_url: String,
    pub database_url: String,
    pub bind_addr: String,
    pub app_timezone: String,
    pub weather_cache_ttl_secs: u64,
    pub batch_delay_ms: u64,
    pub regions_csv_path: String,
    pub migration_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bmkg_base_url: "https://api.bmkg.go.id/publik".to_string(),
            region_api_base_url: "http://localhost:8080/api/v1".to_string(),
            database_url: "sqlite:./regions.db?mode=rwc".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            app_timezone: "Asia/Jakarta".to_string(),
            weather_cache_ttl_secs: 30 * 60,
            batch_delay_ms: 1000,
            regions_csv_path: "indonesian_regions.csv".to_string(),
            migration_batch_size: 500,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        Ok(Config {
            bmkg_base_url: env::var("BMKG_API_BASE_URL").unwrap_or(defaults.bmkg_base_url),
            region_api_base_url: env::var("REGION_API_BASE_URL")
                .unwrap_or(defaults.region_api_base_url),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            app_timezone: env::var("APP_TIMEZONE").unwrap_or(defaults.app_timezone),
            weather_cache_ttl_secs: parse_env(
                "WEATHER_CACHE_TTL_SECS",
                defaults.weather_cache_ttl_secs,
            )?,
            batch_delay_ms: parse_env("WEATHER_BATCH_DELAY_MS", defaults.batch_delay_ms)?,
            regions_csv_path: env::var("REGIONS_CSV_PATH").unwrap_or(defaults.regions_csv_path),
            migration_batch_size: parse_env(
                "MIGRATION_BATCH_SIZE",
                defaults.migration_batch_size,
            )?,
        })
    }

    pub fn weather_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.weather_cache_ttl_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Falls back to Asia/Jakarta when `app_timezone` is not a known zone.
    pub fn timezone(&self) -> chrono_tz::Tz {
        self.app_timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Unknown APP_TIMEZONE '{}', using Asia/Jakarta",
                self.app_timezone
            );
            chrono_tz::Asia::Jakarta
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}
