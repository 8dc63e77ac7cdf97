//! Normalization of provider payloads into `Observation`s
//!
//! Pure functions only: the raw One Call JSON is deserialized into lenient
//! provider structs, then converted into display units with the rounding and
//! classification rules from `classify`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::classify::{self, round1};
use super::{Conditions, Observation, WeatherCode};

/// Maximum number of hourly entries kept
pub const MAX_HOURLY: usize = 48;

/// Maximum number of daily entries kept
pub const MAX_DAILY: usize = 8;

/// Errors raised for payloads that cannot be turned into an observation
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// A required section is absent
    #[error("malformed payload: missing {0}")]
    MissingField(&'static str),

    /// The payload does not have the expected shape
    #[error("malformed payload: {0}")]
    InvalidShape(String),
}

/// One Call response
#[derive(Debug, Deserialize)]
struct RawOneCall {
    current: Option<RawConditions>,
    #[serde(default)]
    hourly: Vec<RawConditions>,
    daily: Option<Vec<RawDaily>>,
}

/// Current and hourly conditions
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConditions {
    dt: i64,
    sunrise: Option<i64>,
    sunset: Option<i64>,
    temp: f64,
    feels_like: f64,
    pressure: f64,
    humidity: f64,
    dew_point: f64,
    uvi: f64,
    clouds: f64,
    visibility: Option<f64>,
    wind_speed: f64,
    wind_deg: f64,
    weather: Vec<RawWeather>,
    rain: Option<RawPrecipitation>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPrecipitation {
    #[serde(rename = "1h", default)]
    one_hour: f64,
}

#[derive(Debug, Deserialize)]
struct RawWeather {
    id: u16,
    #[serde(default)]
    main: String,
}

/// Daily forecast entry
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDaily {
    dt: i64,
    sunrise: Option<i64>,
    sunset: Option<i64>,
    temp: RawDailyTemperature,
    feels_like: RawDailyTemperature,
    pressure: f64,
    humidity: f64,
    dew_point: f64,
    uvi: f64,
    clouds: f64,
    wind_speed: f64,
    wind_deg: f64,
    weather: Vec<RawWeather>,
    rain: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDailyTemperature {
    day: f64,
    min: Option<f64>,
    max: Option<f64>,
}

/// Normalize a One Call payload
///
/// # Returns
/// * `Ok(Observation)` with at least one daily entry
/// * `Err(NormalizeError)` if `current` or `daily[0]` is missing, or the
///   payload has the wrong shape
pub fn normalize_onecall(body: &Value) -> Result<Observation, NormalizeError> {
    let raw = RawOneCall::deserialize(body)
        .map_err(|e| NormalizeError::InvalidShape(e.to_string()))?;

    let current = raw.current.ok_or(NormalizeError::MissingField("current"))?;
    let daily = raw.daily.unwrap_or_default();
    if daily.is_empty() {
        return Err(NormalizeError::MissingField("daily[0]"));
    }

    Ok(Observation {
        current: convert_conditions(current),
        hourly: raw
            .hourly
            .into_iter()
            .take(MAX_HOURLY)
            .map(|hour| {
                let mut conditions = convert_conditions(hour);
                conditions.sunrise = None;
                conditions.sunset = None;
                conditions
            })
            .collect(),
        daily: daily.into_iter().take(MAX_DAILY).map(convert_daily).collect(),
    })
}

fn convert_conditions(raw: RawConditions) -> Conditions {
    let weather = convert_codes(raw.weather);
    Conditions {
        observed_at: timestamp(raw.dt),
        temperature: round1(raw.temp),
        feels_like: round1(raw.feels_like),
        temperature_min: None,
        temperature_max: None,
        humidity: raw.humidity,
        pressure: raw.pressure,
        clouds: raw.clouds,
        dew_point: round1(raw.dew_point),
        uv_index: raw.uvi.max(0.0),
        visibility: raw.visibility.map(classify::visibility_km),
        wind_degrees: raw.wind_deg,
        wind_direction: classify::wind_direction(raw.wind_deg).to_string(),
        wind_speed: classify::wind_speed_kmh(raw.wind_speed),
        rain_1h: raw.rain.map(|rain| rain.one_hour).unwrap_or(0.0),
        rain_24h: 0.0,
        rain: classify::is_rain(&weather),
        snow: classify::is_snow(&weather),
        weather,
        sunrise: raw.sunrise.map(timestamp),
        sunset: raw.sunset.map(timestamp),
    }
}

fn convert_daily(raw: RawDaily) -> Conditions {
    let weather = convert_codes(raw.weather);
    Conditions {
        observed_at: timestamp(raw.dt),
        temperature: round1(raw.temp.day),
        feels_like: round1(raw.feels_like.day),
        temperature_min: raw.temp.min.map(round1),
        temperature_max: raw.temp.max.map(round1),
        humidity: raw.humidity,
        pressure: raw.pressure,
        clouds: raw.clouds,
        dew_point: round1(raw.dew_point),
        uv_index: raw.uvi.max(0.0),
        visibility: None,
        wind_degrees: raw.wind_deg,
        wind_direction: classify::wind_direction(raw.wind_deg).to_string(),
        wind_speed: classify::wind_speed_kmh(raw.wind_speed),
        rain_1h: 0.0,
        rain_24h: raw.rain.unwrap_or(0.0),
        rain: classify::is_rain(&weather),
        snow: classify::is_snow(&weather),
        weather,
        sunrise: raw.sunrise.map(timestamp),
        sunset: raw.sunset.map(timestamp),
    }
}

fn convert_codes(raw: Vec<RawWeather>) -> Vec<WeatherCode> {
    raw.into_iter()
        .map(|code| WeatherCode {
            id: code.id,
            main: code.main,
        })
        .collect()
}

fn timestamp(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or_default()
}
