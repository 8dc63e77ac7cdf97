//! Platform configuration
//!
//! Loaded from a JSON file. Every key has a default; numeric settings outside
//! their valid range are clamped with a warning rather than rejected.

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{ClientConfig, DEFAULT_BASE_URL};

/// Default polling interval in seconds
pub const DEFAULT_HEARTRATE_SECS: u64 = 600;

/// Valid polling interval in seconds
pub const HEARTRATE_SECS_RANGE: (u64, u64) = (10, 7200);

/// Valid request timeout in seconds
pub const TIMEOUT_SECS_RANGE: (u64, u64) = (1, 60);

/// Highest hourly forecast offset that can be exposed
pub const MAX_HOURLY_FORECASTS: usize = 47;

/// Highest daily forecast offset that can be exposed
pub const MAX_DAILY_FORECASTS: usize = 7;

/// Errors that can occur when loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config: missing apikey")]
    MissingApiKey,

    #[error("config: no locations")]
    NoLocations,
}

/// A configured location: a provider city id, a name or a `"lat,lon"` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationEntry {
    Id(u64),
    Text(String),
}

impl LocationEntry {
    /// Location key used for trackers, contexts and history
    pub fn key(&self) -> String {
        match self {
            LocationEntry::Id(id) => id.to_string(),
            LocationEntry::Text(text) => text.trim().to_string(),
        }
    }
}

/// Contents of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Platform name used in log lines
    #[serde(default = "default_name")]
    pub name: String,

    /// OpenWeatherMap API key
    #[serde(default)]
    pub apikey: Option<String>,

    #[serde(default)]
    pub locations: Vec<LocationEntry>,

    /// Number of hourly forecast sensors per location
    #[serde(default)]
    pub hourly_forecasts: usize,

    /// Number of daily forecast sensors per location
    #[serde(default)]
    pub daily_forecasts: usize,

    /// Expose a leak sensor next to the rain sensor
    #[serde(default)]
    pub leak_sensor: bool,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Initial polling interval in seconds
    #[serde(default = "default_heartrate")]
    pub heartrate: u64,

    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_name() -> String {
    "WS".to_string()
}

fn default_timeout() -> u64 {
    15
}

fn default_heartrate() -> u64 {
    DEFAULT_HEARTRATE_SECS
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            apikey: None,
            locations: Vec::new(),
            hourly_forecasts: 0,
            daily_forecasts: 0,
            leak_sensor: false,
            timeout: default_timeout(),
            heartrate: default_heartrate(),
            base_url: default_base_url(),
        }
    }
}

fn clamp_setting<T>(key: &str, value: T, min: T, max: T) -> T
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    if value < min {
        warn!("config: {}: {} below minimum, using {}", key, value, min);
        min
    } else if value > max {
        warn!("config: {}: {} above maximum, using {}", key, value, max);
        max
    } else {
        value
    }
}

impl PlatformConfig {
    /// Read and clamp the config file at `path`
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and clamp a JSON config
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config: PlatformConfig = serde_json::from_str(json)?;
        config.clamp();
        Ok(config)
    }

    fn clamp(&mut self) {
        self.hourly_forecasts =
            clamp_setting("hourly_forecasts", self.hourly_forecasts, 0, MAX_HOURLY_FORECASTS);
        self.daily_forecasts =
            clamp_setting("daily_forecasts", self.daily_forecasts, 0, MAX_DAILY_FORECASTS);
        self.timeout = clamp_setting(
            "timeout",
            self.timeout,
            TIMEOUT_SECS_RANGE.0,
            TIMEOUT_SECS_RANGE.1,
        );
        self.heartrate = clamp_setting(
            "heartrate",
            self.heartrate,
            HEARTRATE_SECS_RANGE.0,
            HEARTRATE_SECS_RANGE.1,
        );
    }

    /// Check that the platform can talk to the provider
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.apikey {
            Some(key) if !key.trim().is_empty() => {}
            _ => return Err(ConfigError::MissingApiKey),
        }
        if self.location_keys().is_empty() {
            return Err(ConfigError::NoLocations);
        }
        Ok(())
    }

    /// Configured location keys, in order, without blanks or duplicates
    pub fn location_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for key in self.locations.iter().map(LocationEntry::key) {
            if key.is_empty() {
                continue;
            }
            if keys.contains(&key) {
                warn!("config: {}: duplicate location ignored", key);
                continue;
            }
            keys.push(key);
        }
        keys
    }

    /// Client settings, or the reason there can be no client
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        self.validate()?;
        let mut client = ClientConfig::new(self.apikey.clone().unwrap_or_default().trim());
        client.base_url = self.base_url.trim_end_matches('/').to_string();
        client.timeout = Duration::from_secs(self.timeout);
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config = PlatformConfig::from_json("{}").expect("Should parse");
        assert_eq!(config, PlatformConfig::default());
        assert_eq!(config.name, "WS");
        assert_eq!(config.heartrate, 600);
        assert_eq!(config.timeout, 15);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_full_config() {
        let config = PlatformConfig::from_json(
            r#"{
                "name": "Weather",
                "apikey": "secret",
                "locations": ["De Bilt,NL", 2757783, "52.09,5.12"],
                "hourly_forecasts": 3,
                "daily_forecasts": 2,
                "leak_sensor": true,
                "timeout": 5,
                "heartrate": 300
            }"#,
        )
        .expect("Should parse");

        assert_eq!(config.name, "Weather");
        assert_eq!(
            config.location_keys(),
            vec!["De Bilt,NL", "2757783", "52.09,5.12"]
        );
        assert_eq!(config.hourly_forecasts, 3);
        assert_eq!(config.daily_forecasts, 2);
        assert!(config.leak_sensor);
        assert_eq!(config.heartrate, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = PlatformConfig::from_json(
            r#"{"hourly_forecasts": 100, "daily_forecasts": 9, "timeout": 0, "heartrate": 99999}"#,
        )
        .expect("Should parse");

        assert_eq!(config.hourly_forecasts, MAX_HOURLY_FORECASTS);
        assert_eq!(config.daily_forecasts, MAX_DAILY_FORECASTS);
        assert_eq!(config.timeout, 1);
        assert_eq!(config.heartrate, 7200);
    }

    #[test]
    fn test_missing_apikey() {
        let config = PlatformConfig::from_json(r#"{"locations": ["Utrecht"]}"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingApiKey)));

        let config =
            PlatformConfig::from_json(r#"{"apikey": "  ", "locations": ["Utrecht"]}"#).unwrap();
        assert!(matches!(config.client_config(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn test_no_locations() {
        let config = PlatformConfig::from_json(r#"{"apikey": "secret", "locations": [" "]}"#)
            .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoLocations)));
    }

    #[test]
    fn test_duplicate_locations_are_dropped() {
        let config = PlatformConfig::from_json(
            r#"{"locations": ["Utrecht", " Utrecht ", 42, "42"]}"#,
        )
        .unwrap();
        assert_eq!(config.location_keys(), vec!["Utrecht", "42"]);
    }

    #[test]
    fn test_client_config() {
        let config = PlatformConfig::from_json(
            r#"{"apikey": "secret", "locations": ["Utrecht"], "timeout": 7, "base_url": "http://localhost:8080/"}"#,
        )
        .unwrap();
        let client = config.client_config().expect("Should build client config");
        assert_eq!(client.api_key, "secret");
        assert_eq!(client.base_url, "http://localhost:8080");
        assert_eq!(client.timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"apikey": "secret", "locations": ["Utrecht"]}"#).unwrap();

        let config = PlatformConfig::from_file(&path).expect("Should load");
        assert_eq!(config.apikey.as_deref(), Some("secret"));

        let missing = PlatformConfig::from_file(&temp_dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            PlatformConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
