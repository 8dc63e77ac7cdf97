//! Core weather data models
//!
//! This module contains the provider-agnostic `Observation` produced by the
//! normalizer and consumed by every sensor projection, together with the
//! provider client, the payload normalizer and location resolution.

pub mod classify;
pub mod client;
pub mod geocode;
pub mod normalize;

pub use client::{
    ApiVersion, ClientConfig, ClientEvent, HttpResponse, ProviderErrorKind, ReqwestTransport,
    Transport, WeatherClient, WeatherError, DEFAULT_BASE_URL,
};
pub use geocode::{LocationSpec, ResolvedLocation};
pub use normalize::{normalize_onecall, NormalizeError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single provider weather condition code with its short label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherCode {
    /// Provider condition id (2xx thunderstorm, 3xx drizzle, 5xx rain, 6xx snow, ...)
    pub id: u16,
    /// Short label, e.g. "Rain" or "Clouds"
    pub main: String,
}

impl WeatherCode {
    /// The hundreds digit of the condition id, identifying the condition group
    pub fn group(&self) -> u16 {
        self.id / 100
    }
}

/// Normalized conditions for one point in time
///
/// Used for the current observation as well as for each hourly and daily
/// forecast entry. Values are already in display units and rounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    /// Time the observation or forecast applies to
    pub observed_at: DateTime<Utc>,
    /// Temperature in Celsius, 1 decimal
    pub temperature: f64,
    /// Apparent temperature in Celsius, 1 decimal
    pub feels_like: f64,
    /// Minimum temperature in Celsius (daily entries only)
    pub temperature_min: Option<f64>,
    /// Maximum temperature in Celsius (daily entries only)
    pub temperature_max: Option<f64>,
    /// Relative humidity percentage (0-100)
    pub humidity: f64,
    /// Air pressure in hPa
    pub pressure: f64,
    /// Cloud cover percentage (0-100)
    pub clouds: f64,
    /// Dew point in Celsius, 1 decimal
    pub dew_point: f64,
    /// UV index, never negative
    pub uv_index: f64,
    /// Visibility in whole kilometres, if the provider reports it
    pub visibility: Option<u32>,
    /// Wind direction in degrees (0-360)
    pub wind_degrees: f64,
    /// Wind direction as a 16-point compass label
    pub wind_direction: String,
    /// Wind speed in km/h, 1 decimal
    pub wind_speed: f64,
    /// Provider condition codes in provider order
    pub weather: Vec<WeatherCode>,
    /// Precipitation over the last hour in mm
    pub rain_1h: f64,
    /// Precipitation over the day in mm (daily entries only)
    pub rain_24h: f64,
    /// Whether any condition code is thunderstorm, drizzle or rain
    pub rain: bool,
    /// Whether any condition code is snow
    pub snow: bool,
    /// Sunrise time (current and daily entries only)
    pub sunrise: Option<DateTime<Utc>>,
    /// Sunset time (current and daily entries only)
    pub sunset: Option<DateTime<Utc>>,
}

impl Conditions {
    /// The first (primary) condition code, if any
    pub fn primary(&self) -> Option<&WeatherCode> {
        self.weather.first()
    }
}

/// Normalized weather snapshot for one location
///
/// `hourly[0]` is the current hour and `daily[0]` is today. The normalizer
/// guarantees `daily` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Current conditions
    pub current: Conditions,
    /// Hourly forecast, up to 48 entries
    pub hourly: Vec<Conditions>,
    /// Daily forecast, up to 8 entries
    pub daily: Vec<Conditions>,
}

impl Observation {
    /// Today's daily entry
    pub fn today(&self) -> Option<&Conditions> {
        self.daily.first()
    }
}
