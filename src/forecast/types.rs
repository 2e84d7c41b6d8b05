use crate::regions::Region;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw `prakiraan-cuaca` payload: observation records in provider order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BmkgResponse {
    pub data: Vec<BmkgRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BmkgRecord {
    pub utc_datetime: String,
    pub local_datetime: String,
    /// Temperature, °C
    pub t: f64,
    /// Relative humidity, %
    pub hu: f64,
    pub weather_desc: String,
    #[serde(default)]
    pub weather_desc_en: String,
    /// Wind speed, km/h
    pub ws: f64,
    pub wd: String,
    /// Total cloud cover, %
    pub tcc: f64,
    #[serde(default)]
    pub vs_text: String,
    #[serde(default)]
    pub analysis_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWeather {
    pub temperature: f64,
    pub humidity: f64,
    pub weather_desc: String,
    pub weather_desc_en: String,
    pub wind_speed: f64,
    pub wind_direction: String,
    pub cloud_cover: f64,
    pub visibility: String,
    pub datetime: DateTime<Utc>,
    pub local_datetime: NaiveDateTime,
}

/// One 3-hour forecast slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastWeather {
    #[serde(flatten)]
    pub weather: CurrentWeather,
    #[serde(default)]
    pub forecast_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherSource {
    Bmkg,
    Fallback,
}

/// A value tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Sourced<T> {
    Bmkg(T),
    Fallback(T),
}

impl<T> Sourced<T> {
    pub fn source(&self) -> WeatherSource {
        match self {
            Sourced::Bmkg(_) => WeatherSource::Bmkg,
            Sourced::Fallback(_) => WeatherSource::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Sourced::Fallback(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Sourced::Bmkg(value) | Sourced::Fallback(value) => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Sourced::Bmkg(value) | Sourced::Fallback(value) => value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherResponse {
    pub region: Region,
    pub current: Option<Sourced<CurrentWeather>>,
    pub forecast: Vec<ForecastWeather>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub entries: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sourced_serializes_as_tagged_union() {
        let value: Sourced<u32> = Sourced::Fallback(7);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "fallback", "value": 7}));

        let parsed: Sourced<u32> =
            serde_json::from_value(serde_json::json!({"kind": "bmkg", "value": 3})).unwrap();
        assert_eq!(parsed.source(), WeatherSource::Bmkg);
        assert!(!parsed.is_fallback());
        assert_eq!(parsed.into_value(), 3);
    }

    #[test]
    fn test_record_tolerates_missing_optional_fields() {
        let record: BmkgRecord = serde_json::from_value(serde_json::json!({
            "utc_datetime": "2024-01-01 00:00:00",
            "local_datetime": "2024-01-01 07:00:00",
            "t": 27,
            "hu": 80,
            "weather_desc": "Berawan",
            "ws": 5.2,
            "wd": "SE",
            "tcc": 64
        }))
        .unwrap();
        assert_eq!(record.t, 27.0);
        assert!(record.weather_desc_en.is_empty());
        assert!(record.analysis_date.is_none());
    }
}
