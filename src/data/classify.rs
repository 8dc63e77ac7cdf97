//! Classification helpers shared by the normalizer and the sensor projections
//!
//! Wind-direction bucketing, precipitation flags, pressure trend and the
//! rounding policy for displayed values.

use serde::{Deserialize, Serialize};

use super::WeatherCode;

/// 16-point compass rose, clockwise from North
const COMPASS_ROSE: [&str; 16] = [
    "North", "NNE", "NE", "ENE", "East", "ESE", "SE", "SSE", "South", "SSW", "SW", "WSW", "West",
    "WNW", "NW", "NNW",
];

/// Metres per second to kilometres per hour
const MPS_TO_KMH: f64 = 3.6;

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Convert a provider wind speed in m/s to km/h, rounded to one decimal
pub fn wind_speed_kmh(mps: f64) -> f64 {
    round1(mps * MPS_TO_KMH)
}

/// Convert a visibility in metres to whole kilometres
pub fn visibility_km(metres: f64) -> u32 {
    (metres.max(0.0) / 1000.0).round() as u32
}

/// Map a wind direction in degrees to a 16-point compass label
///
/// Buckets are centred on the compass points, so 359° is "North".
pub fn wind_direction(degrees: f64) -> &'static str {
    let index = (degrees * 16.0 / 360.0).round() as i64;
    COMPASS_ROSE[index.rem_euclid(16) as usize]
}

/// Whether any code is thunderstorm (2xx), drizzle (3xx) or rain (5xx)
pub fn is_rain(codes: &[WeatherCode]) -> bool {
    codes.iter().any(|code| matches!(code.group(), 2 | 3 | 5))
}

/// Whether any code is snow (6xx)
pub fn is_snow(codes: &[WeatherCode]) -> bool {
    codes.iter().any(|code| code.group() == 6)
}

/// Comma-joined condition labels, in provider order
pub fn condition_text(codes: &[WeatherCode]) -> String {
    codes
        .iter()
        .map(|code| code.main.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Discrete weather trend shown next to the air pressure
///
/// Discriminants are the values the accessory protocol expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureTrend {
    Blank = 0,
    Sun = 1,
    CloudsSun = 3,
    Rain = 4,
    RainWind = 12,
}

impl PressureTrend {
    /// Classify the primary condition code
    pub fn from_code(code: Option<&WeatherCode>) -> Self {
        let Some(code) = code else {
            return PressureTrend::Blank;
        };
        match code.id {
            200..=299 => PressureTrend::RainWind,
            300..=399 | 500..=699 => PressureTrend::Rain,
            800 => PressureTrend::Sun,
            801..=804 => PressureTrend::CloudsSun,
            _ => PressureTrend::Blank,
        }
    }

    /// Numeric value published to the host
    pub fn code(self) -> u8 {
        self as u8
    }
}
