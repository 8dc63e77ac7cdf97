//! Location resolution
//!
//! A configured location is a city id, a `"lat,lon"` pair or a free-form
//! name. Resolution turns it into coordinates once; the result is cached by
//! the tracker and persisted in the context store.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::{ProviderErrorKind, WeatherClient, WeatherError};

/// A configured location, before resolution
#[derive(Debug, Clone, PartialEq)]
pub enum LocationSpec {
    /// Provider city id
    CityId(u64),
    /// Explicit coordinates
    Coordinates { latitude: f64, longitude: f64 },
    /// Free-form place name, e.g. "De Bilt,NL"
    Name(String),
}

impl LocationSpec {
    /// Parse a location key
    pub fn parse(key: &str) -> Self {
        let key = key.trim();
        if let Ok(id) = key.parse::<u64>() {
            return LocationSpec::CityId(id);
        }
        if let Some((lat, lon)) = key.split_once(',') {
            if let (Ok(latitude), Ok(longitude)) = (lat.trim().parse(), lon.trim().parse()) {
                if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
                    return LocationSpec::Coordinates {
                        latitude,
                        longitude,
                    };
                }
            }
        }
        LocationSpec::Name(key.to_string())
    }
}

/// Coordinates and identity of a resolved location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Provider city id, when known
    pub city_id: Option<u64>,
    /// Display name reported by the provider
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct GeoMatch {
    name: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CityWeather {
    id: u64,
    name: String,
    coord: CityCoord,
}

#[derive(Debug, Deserialize)]
struct CityCoord {
    lat: f64,
    lon: f64,
}

fn not_found(what: &str) -> WeatherError {
    WeatherError::Provider {
        kind: ProviderErrorKind::NotFound,
        status: 404,
        message: format!("no match for {}", what),
    }
}

fn display_name(found: &GeoMatch) -> String {
    match &found.country {
        Some(country) => format!("{}, {}", found.name, country),
        None => found.name.clone(),
    }
}

impl WeatherClient {
    /// Resolve a configured location to coordinates
    pub async fn resolve(&self, spec: &LocationSpec) -> Result<ResolvedLocation, WeatherError> {
        match spec {
            LocationSpec::CityId(id) => {
                let body = self.fetch_current_weather(&[("id", id.to_string())]).await?;
                let city: CityWeather = serde_json::from_value(body)?;
                Ok(ResolvedLocation {
                    latitude: city.coord.lat,
                    longitude: city.coord.lon,
                    city_id: Some(city.id),
                    name: city.name,
                })
            }
            LocationSpec::Name(name) => {
                let body = self
                    .get_geo("direct", &[("q", name.clone()), ("limit", "1".to_string())])
                    .await?;
                let found = first_match(body)?.ok_or_else(|| not_found(name))?;
                Ok(ResolvedLocation {
                    latitude: found.lat,
                    longitude: found.lon,
                    city_id: None,
                    name: display_name(&found),
                })
            }
            LocationSpec::Coordinates {
                latitude,
                longitude,
            } => {
                let fallback = format!("{:.4},{:.4}", latitude, longitude);
                let name = match self.reverse_geocode(*latitude, *longitude).await {
                    Ok(Some(name)) => name,
                    Ok(None) => fallback,
                    Err(error) => {
                        warn!("reverse geocoding {} failed: {}", fallback, error);
                        fallback
                    }
                };
                Ok(ResolvedLocation {
                    latitude: *latitude,
                    longitude: *longitude,
                    city_id: None,
                    name,
                })
            }
        }
    }

    /// Look up the name of the place at the given coordinates
    pub async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<String>, WeatherError> {
        let body = self
            .get_geo(
                "reverse",
                &[
                    ("lat", latitude.to_string()),
                    ("lon", longitude.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(first_match(body)?.map(|found| display_name(&found)))
    }
}

fn first_match(body: Value) -> Result<Option<GeoMatch>, WeatherError> {
    let matches: Vec<GeoMatch> = serde_json::from_value(body)?;
    Ok(matches.into_iter().next())
}
