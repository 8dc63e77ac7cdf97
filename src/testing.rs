//! Shared fixtures and fakes for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::data::{normalize_onecall, HttpResponse, Observation, Transport, WeatherError};
use crate::host::{AccessoryHost, DeviceInfo, ServiceDescriptor};
use crate::sensors::Value;

/// One Call payload: rain and mist now, clear next hour, snow tomorrow
pub const ONECALL_FIXTURE: &str = r#"{
    "lat": 52.11,
    "lon": 5.18,
    "timezone": "Europe/Amsterdam",
    "current": {
        "dt": 1720000000,
        "sunrise": 1719976000,
        "sunset": 1720035000,
        "temp": 21.27,
        "feels_like": 20.94,
        "pressure": 1014,
        "humidity": 64,
        "dew_point": 14.03,
        "uvi": 5.2,
        "clouds": 75,
        "visibility": 10000,
        "wind_speed": 5.0,
        "wind_deg": 92,
        "weather": [
            {"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"},
            {"id": 701, "main": "Mist", "description": "mist", "icon": "50d"}
        ],
        "rain": {"1h": 0.4}
    },
    "hourly": [
        {
            "dt": 1720000000, "temp": 21.0, "feels_like": 20.6, "pressure": 1014,
            "humidity": 64, "dew_point": 14.0, "uvi": 5.2, "clouds": 75,
            "visibility": 10000, "wind_speed": 5.0, "wind_deg": 92,
            "weather": [{"id": 500, "main": "Rain"}], "rain": {"1h": 0.4}
        },
        {
            "dt": 1720003600, "temp": 20.45, "feels_like": 20.1, "pressure": 1015,
            "humidity": 60, "dew_point": 12.2, "uvi": 3.1, "clouds": 5,
            "visibility": 10000, "wind_speed": 3.0, "wind_deg": 180,
            "weather": [{"id": 800, "main": "Clear"}]
        },
        {
            "dt": 1720007200, "temp": 19.0, "feels_like": 18.7, "pressure": 1015,
            "humidity": 66, "dew_point": 12.5, "uvi": -0.5, "clouds": 60,
            "visibility": 9000, "wind_speed": 2.5, "wind_deg": 270,
            "weather": [{"id": 803, "main": "Clouds"}]
        }
    ],
    "daily": [
        {
            "dt": 1719997200, "sunrise": 1719976000, "sunset": 1720035000,
            "temp": {"day": 22.08, "min": 14.2, "max": 24.6, "night": 15.0, "eve": 20.0, "morn": 15.5},
            "feels_like": {"day": 21.5, "night": 14.8, "eve": 19.6, "morn": 15.1},
            "pressure": 1013, "humidity": 60, "dew_point": 13.1, "wind_speed": 4.0,
            "wind_deg": 200, "clouds": 40, "pop": 0.8, "uvi": 6.1, "rain": 3.2,
            "weather": [{"id": 500, "main": "Rain"}]
        },
        {
            "dt": 1720083600, "sunrise": 1720062450, "sunset": 1720121380,
            "temp": {"day": 2.0, "min": -3.0, "max": 4.0, "night": -1.0, "eve": 1.0, "morn": -2.0},
            "feels_like": {"day": -1.2, "night": -4.0, "eve": -2.0, "morn": -5.0},
            "pressure": 1002, "humidity": 88, "dew_point": 0.5, "wind_speed": 6.0,
            "wind_deg": 10, "clouds": 100, "pop": 1.0, "uvi": 0.8, "snow": 5.0,
            "weather": [{"id": 601, "main": "Snow"}]
        }
    ]
}"#;

/// The fixture, normalized
pub fn onecall_fixture() -> Observation {
    let body = serde_json::from_str(ONECALL_FIXTURE).expect("Fixture should be valid JSON");
    normalize_onecall(&body).expect("Fixture should normalize")
}

/// Transport replaying scripted responses in order and recording requested URLs
#[derive(Default)]
pub struct ScriptedTransport {
    /// Responses with the delay before each is delivered
    responses: Mutex<VecDeque<(Duration, Result<HttpResponse, WeatherError>)>>,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, status: u16, body: &str) {
        self.push_delayed_ok(status, body, Duration::ZERO);
    }

    /// Script a response that takes `delay` to arrive
    pub fn push_delayed_ok(&self, status: u16, body: &str, delay: Duration) {
        self.responses.lock().unwrap().push_back((
            delay,
            Ok(HttpResponse {
                status,
                body: body.to_string(),
            }),
        ));
    }

    pub fn push_network_error(&self, message: &str) {
        self.responses.lock().unwrap().push_back((
            Duration::ZERO,
            Err(WeatherError::Network(message.to_string())),
        ));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, WeatherError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(url.to_string());

        let scripted = self.responses.lock().unwrap().pop_front();
        let (delay, response) = scripted.unwrap_or_else(|| {
            (
                Duration::ZERO,
                Err(WeatherError::Network("no scripted response".to_string())),
            )
        });
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

/// Host recording every call it receives
#[derive(Default)]
pub struct RecordingHost {
    pub registered: Mutex<Vec<(DeviceInfo, Vec<String>)>>,
    pub unregistered: Mutex<Vec<String>>,
    pub published: Mutex<Vec<(String, String, String, Value)>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last published value for a service characteristic
    pub fn last_value(&self, service: &str, key: &str) -> Option<Value> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(_, s, k, _)| s == service && k == key)
            .map(|(_, _, _, value)| value.clone())
    }
}

impl AccessoryHost for RecordingHost {
    fn register(&self, device: &DeviceInfo, services: &[ServiceDescriptor]) {
        self.registered.lock().unwrap().push((
            device.clone(),
            services.iter().map(|s| s.name.clone()).collect(),
        ));
    }

    fn unregister(&self, device_id: &str) {
        self.unregistered.lock().unwrap().push(device_id.to_string());
    }

    fn publish(&self, device_id: &str, service: &str, key: &str, value: &Value) {
        self.published.lock().unwrap().push((
            device_id.to_string(),
            service.to_string(),
            key.to_string(),
            value.clone(),
        ));
    }
}
