use super::fallback::generate_fallback;
use super::types::*;
use super::{init_cache, WeatherCache};
use crate::config::Config;
use crate::regions::Region;
use chrono::{NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const BMKG_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const ISO_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Error, Debug)]
pub enum BmkgError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("API error: HTTP {0}")]
    ApiError(u16),
    #[error("No weather records for region {0}")]
    EmptyPayload(String),
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Client for the BMKG public forecast API.
///
/// Every public fetch absorbs provider failures: callers get `None` or an
/// empty forecast and decide whether to substitute fallback data.
pub struct BmkgClient {
    client: Client,
    base_url: String,
    cache: WeatherCache,
    timezone: Tz,
}

impl BmkgClient {
    pub fn new(config: &Config) -> Result<Self, BmkgError> {
        let client = Client::builder()
            .user_agent("RegionWeather/1.0")
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.bmkg_base_url.trim_end_matches('/').to_string(),
            cache: init_cache(config.weather_cache_ttl()),
            timezone: config.timezone(),
        })
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = init_cache(ttl);
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Latest reading: the first record of the provider payload.
    pub async fn fetch_current(&self, region_code: &str) -> Option<CurrentWeather> {
        let payload = self.cached_payload(region_code).await?;
        let record = payload.data.first()?;
        match CurrentWeather::try_from(record) {
            Ok(current) => Some(current),
            Err(e) => {
                tracing::warn!("Unusable current reading for {}: {}", region_code, e);
                None
            }
        }
    }

    /// Every parsable record of the payload, oldest first.
    pub async fn fetch_forecast(&self, region_code: &str) -> Vec<ForecastWeather> {
        let Some(payload) = self.cached_payload(region_code).await else {
            return Vec::new();
        };

        let mut forecast: Vec<ForecastWeather> = payload
            .data
            .iter()
            .filter_map(|record| match CurrentWeather::try_from(record) {
                Ok(weather) => Some(ForecastWeather {
                    forecast_time: Some(weather.datetime),
                    weather,
                }),
                Err(e) => {
                    tracing::debug!("Skipping forecast record for {}: {}", region_code, e);
                    None
                }
            })
            .collect();
        forecast.sort_by_key(|f| f.weather.datetime);
        forecast
    }

    pub async fn current_or_fallback(&self, region: &Region) -> Sourced<CurrentWeather> {
        match self.fetch_current(&region.code).await {
            Some(current) => Sourced::Bmkg(current),
            None => {
                tracing::debug!("Using fallback weather for {}", region.code);
                Sourced::Fallback(generate_fallback(region, self.timezone))
            }
        }
    }

    pub async fn weather_for_region(&self, region: &Region) -> WeatherResponse {
        let current = self.current_or_fallback(region).await;
        let forecast = self.fetch_forecast(&region.code).await;
        WeatherResponse {
            region: region.clone(),
            current: Some(current),
            forecast,
        }
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
        tracing::info!("Weather cache cleared");
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.run_pending_tasks().await;
        let mut entries: Vec<String> = self
            .cache
            .iter()
            .map(|(code, _)| code.as_ref().clone())
            .collect();
        entries.sort();
        CacheStats {
            size: entries.len(),
            entries,
        }
    }

    async fn cached_payload(&self, region_code: &str) -> Option<Arc<BmkgResponse>> {
        let code = region_code.trim();
        if let Some(payload) = self.cache.get(code).await {
            tracing::debug!("Weather cache hit for {}", code);
            return Some(payload);
        }

        match self.fetch_payload(code).await {
            Ok(payload) => {
                let payload = Arc::new(payload);
                self.cache.insert(code.to_string(), payload.clone()).await;
                Some(payload)
            }
            Err(e) => {
                tracing::warn!("BMKG fetch failed for {}: {}", code, e);
                None
            }
        }
    }

    async fn fetch_payload(&self, region_code: &str) -> Result<BmkgResponse, BmkgError> {
        let url = format!("{}/prakiraan-cuaca", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("adm4", region_code)])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BmkgError::ApiError(status.as_u16()));
        }

        let body = response.bytes().await?;
        let payload: BmkgResponse = serde_json::from_slice(&body)?;
        if payload.data.is_empty() {
            return Err(BmkgError::EmptyPayload(region_code.to_string()));
        }
        Ok(payload)
    }
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime, BmkgError> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, BMKG_DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, ISO_DATETIME_FORMAT))
        .map_err(|_| BmkgError::InvalidTimestamp(value.to_string()))
}

impl TryFrom<&BmkgRecord> for CurrentWeather {
    type Error = BmkgError;

    fn try_from(record: &BmkgRecord) -> Result<Self, Self::Error> {
        let utc = parse_datetime(&record.utc_datetime)?;
        let local = parse_datetime(&record.local_datetime)?;

        Ok(Self {
            temperature: record.t,
            humidity: record.hu,
            weather_desc: record.weather_desc.clone(),
            weather_desc_en: record.weather_desc_en.clone(),
            wind_speed: record.ws,
            wind_direction: record.wd.clone(),
            cloud_cover: record.tcc,
            visibility: record.vs_text.clone(),
            datetime: Utc.from_utc_datetime(&utc),
            local_datetime: local,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(utc: &str, local: &str, t: f64, desc: &str) -> serde_json::Value {
        json!({
            "utc_datetime": utc,
            "local_datetime": local,
            "t": t,
            "hu": 78,
            "weather_desc": desc,
            "weather_desc_en": "Cloudy",
            "ws": 7.4,
            "wd": "SW",
            "tcc": 90,
            "vs_text": "> 10 km",
            "analysis_date": "2024-06-01T00:00:00"
        })
    }

    fn payload() -> serde_json::Value {
        json!({
            "data": [
                record("2024-06-01 03:00:00", "2024-06-01 10:00:00", 31.0, "Berawan"),
                record("2024-06-01 00:00:00", "2024-06-01 07:00:00", 27.0, "Cerah"),
                record("not a date", "2024-06-01 13:00:00", 33.0, "Hujan"),
                record("2024-06-01 06:00:00", "2024-06-01 13:00:00", 32.0, "Berawan")
            ]
        })
    }

    fn client_for(server: &MockServer) -> BmkgClient {
        let config = Config {
            bmkg_base_url: server.uri(),
            ..Config::default()
        };
        BmkgClient::new(&config).unwrap()
    }

    async fn mount_payload(server: &MockServer, code: &str, body: serde_json::Value, hits: u64) {
        Mock::given(method("GET"))
            .and(path("/prakiraan-cuaca"))
            .and(query_param("adm4", code))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(hits)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_current_uses_first_record() {
        let server = MockServer::start().await;
        mount_payload(&server, "31.71.01.1001", payload(), 1).await;

        let client = client_for(&server);
        let current = client.fetch_current("31.71.01.1001").await.unwrap();

        assert_eq!(current.temperature, 31.0);
        assert_eq!(current.weather_desc, "Berawan");
        assert_eq!(current.wind_direction, "SW");
        assert_eq!(current.visibility, "> 10 km");
        assert_eq!(current.datetime.to_rfc3339(), "2024-06-01T03:00:00+00:00");
        assert_eq!(
            current.local_datetime.format("%H:%M").to_string(),
            "10:00"
        );
    }

    #[tokio::test]
    async fn test_forecast_sorted_and_skips_bad_records() {
        let server = MockServer::start().await;
        mount_payload(&server, "31.71.01.1001", payload(), 1).await;

        let client = client_for(&server);
        let forecast = client.fetch_forecast("31.71.01.1001").await;

        assert_eq!(forecast.len(), 3);
        let temps: Vec<f64> = forecast.iter().map(|f| f.weather.temperature).collect();
        assert_eq!(temps, vec![27.0, 31.0, 32.0]);
        assert!(forecast
            .iter()
            .all(|f| f.forecast_time == Some(f.weather.datetime)));
    }

    #[tokio::test]
    async fn test_repeat_fetch_within_ttl_hits_cache() {
        let server = MockServer::start().await;
        mount_payload(&server, "31.71.01.1001", payload(), 1).await;

        let client = client_for(&server);
        let first = client.fetch_current("31.71.01.1001").await;
        let second = client.fetch_current("31.71.01.1001").await;
        let forecast = client.fetch_forecast("31.71.01.1001").await;

        assert_eq!(first, second);
        assert_eq!(forecast.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_after_expiry_goes_to_network() {
        let server = MockServer::start().await;
        mount_payload(&server, "31.71.01.1001", payload(), 2).await;

        let client = client_for(&server).with_cache_ttl(Duration::from_millis(200));
        assert!(client.fetch_current("31.71.01.1001").await.is_some());
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(client.fetch_current("31.71.01.1001").await.is_some());
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let server = MockServer::start().await;
        mount_payload(&server, "31.71.01.1001", payload(), 2).await;

        let client = client_for(&server);
        client.fetch_current("31.71.01.1001").await;
        assert_eq!(client.cache_stats().await.entries, vec!["31.71.01.1001"]);

        client.clear_cache();
        assert_eq!(client.cache_stats().await.size, 0);
        client.fetch_current("31.71.01.1001").await;
    }

    #[tokio::test]
    async fn test_failures_are_absent_and_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("adm4", "31.71.01.1001"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("adm4", "31.71.01.1002"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;
        mount_payload(&server, "31.71.01.1003", json!({"data": []}), 1).await;

        let client = client_for(&server);
        assert!(client.fetch_current("31.71.01.1001").await.is_none());
        assert!(client.fetch_forecast("31.71.01.1001").await.is_empty());
        assert!(client.fetch_current("31.71.01.1002").await.is_none());
        assert!(client.fetch_current("31.71.01.1003").await.is_none());
        assert_eq!(client.cache_stats().await.size, 0);
    }

    #[tokio::test]
    async fn test_current_or_fallback_tags_provenance() {
        let server = MockServer::start().await;
        mount_payload(&server, "31.71.01.1001", payload(), 1).await;
        Mock::given(method("GET"))
            .and(query_param("adm4", "31.71.01.1002"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let live = Region::from_code("31.71.01.1001", "Gambir").unwrap();
        let missing = Region::from_code("31.71.01.1002", "Kebon Kelapa")
            .unwrap()
            .with_coordinates(-6.17, 106.82);

        let reading = client.current_or_fallback(&live).await;
        assert_eq!(reading.source(), WeatherSource::Bmkg);

        let reading = client.current_or_fallback(&missing).await;
        assert!(reading.is_fallback());

        let response = client.weather_for_region(&missing).await;
        assert!(response.current.unwrap().is_fallback());
        assert!(response.forecast.is_empty());
        assert_eq!(response.region.code, "31.71.01.1002");
    }
}
