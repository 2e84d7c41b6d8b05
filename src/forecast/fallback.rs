use super::types::CurrentWeather;
use crate::regions::Region;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Latitude (absolute degrees) beyond which the cooler base applies.
pub const COOL_LATITUDE_THRESHOLD: f64 = 7.0;
pub const TEMPERATURE_VARIATION: f64 = 4.0;

/// (Indonesian, English) condition pairs.
pub const CONDITIONS: [(&str, &str); 5] = [
    ("Cerah", "Sunny"),
    ("Cerah Berawan", "Partly Cloudy"),
    ("Berawan", "Mostly Cloudy"),
    ("Berawan Tebal", "Overcast"),
    ("Hujan Ringan", "Light Rain"),
];

pub const VISIBILITY: [&str; 5] = ["5 km", "8 km", "10 km", "15 km", "20 km"];

pub const WIND_DIRECTIONS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

pub fn base_temperature(latitude: Option<f64>) -> f64 {
    match latitude {
        Some(lat) if lat.abs() > COOL_LATITUDE_THRESHOLD => 22.0,
        Some(lat) if lat > 0.0 => 26.0,
        _ => 28.0,
    }
}

/// The region's own zone when it names a valid one, else `default`.
pub fn region_timezone(region: &Region, default: Tz) -> Tz {
    region
        .timezone
        .as_deref()
        .and_then(|tz| tz.parse().ok())
        .unwrap_or(default)
}

/// Synthetic reading for a region the provider could not serve.
pub fn generate_fallback(region: &Region, default_tz: Tz) -> CurrentWeather {
    let mut rng = fastrand::Rng::new();
    generate_fallback_with(&mut rng, region, default_tz, Utc::now())
}

pub fn generate_fallback_with(
    rng: &mut fastrand::Rng,
    region: &Region,
    default_tz: Tz,
    now: DateTime<Utc>,
) -> CurrentWeather {
    let base = base_temperature(region.latitude);
    let variation = rng.f64() * 2.0 * TEMPERATURE_VARIATION - TEMPERATURE_VARIATION;
    let temperature = ((base + variation) * 10.0).round() / 10.0;
    let (weather_desc, weather_desc_en) = CONDITIONS[rng.usize(..CONDITIONS.len())];

    CurrentWeather {
        temperature,
        humidity: f64::from(60 + rng.u32(0..35)),
        weather_desc: weather_desc.to_string(),
        weather_desc_en: weather_desc_en.to_string(),
        wind_speed: f64::from(5 + rng.u32(0..20)),
        wind_direction: WIND_DIRECTIONS[rng.usize(..WIND_DIRECTIONS.len())].to_string(),
        cloud_cover: f64::from(rng.u32(0..=100)),
        visibility: VISIBILITY[rng.usize(..VISIBILITY.len())].to_string(),
        datetime: now,
        local_datetime: now
            .with_timezone(&region_timezone(region, default_tz))
            .naive_local(),
    }
}
