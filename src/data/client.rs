//! OpenWeatherMap API client
//!
//! This module issues GET requests against the provider, serialising them
//! through a single request slot, retrying transient network failures and
//! classifying provider errors. The raw transport sits behind the `Transport`
//! trait so the client can be driven without a network.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Base URL for the OpenWeatherMap API
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Classification of an error reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Too many requests (429)
    RateLimited,
    /// Invalid or unsubscribed API key (401)
    Unauthorized,
    /// Unknown location (404)
    NotFound,
    /// Any other non-success status
    Other,
}

impl ProviderErrorKind {
    /// Classify an HTTP status (or a provider `cod` embedded in the body)
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ProviderErrorKind::Unauthorized,
            404 => ProviderErrorKind::NotFound,
            429 => ProviderErrorKind::RateLimited,
            _ => ProviderErrorKind::Other,
        }
    }
}

/// Errors that can occur when talking to the provider
#[derive(Debug, Error)]
pub enum WeatherError {
    /// Timeout, DNS failure, refused or reset connection
    #[error("network error: {0}")]
    Network(String),

    /// Non-success status, or an error code embedded in a 200 body
    #[error("provider error {status} ({kind:?}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        status: u16,
        message: String,
    },

    /// Response body is not JSON
    #[error("failed to parse JSON response: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Request URL could not be built
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl WeatherError {
    /// The provider error kind, if this is a provider error
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            WeatherError::Provider { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Raw HTTP response handed back by a `Transport`
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

/// Issues a single GET request
///
/// Implementations report connection-level failures (including timeouts) as
/// `WeatherError::Network`; any received status is returned as a response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, WeatherError>;
}

/// `Transport` backed by reqwest
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, WeatherError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(network_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(network_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn network_error(error: reqwest::Error) -> WeatherError {
    if error.is_timeout() {
        WeatherError::Network("request timed out".to_string())
    } else if error.is_connect() {
        WeatherError::Network(format!("connection failed: {}", error))
    } else {
        WeatherError::Network(error.to_string())
    }
}

/// Data API version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    /// One Call 3.0, the default
    Current,
    /// 2.5, used after the current version rejects the key
    Legacy,
}

impl ApiVersion {
    /// Path segment for this version
    pub fn path(self) -> &'static str {
        match self {
            ApiVersion::Current => "3.0",
            ApiVersion::Legacy => "2.5",
        }
    }
}

/// Structured client events, consumed by logging only
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A request is about to be sent (resource excludes the API key)
    Request { id: u64, resource: String },
    /// A response was received
    Response { id: u64, status: u16 },
    /// A request failed
    Error { id: u64, error: String },
    /// The client switched API versions for the rest of the process lifetime
    VersionFallback { from: ApiVersion, to: ApiVersion },
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientEvent::Request { id, resource } => write!(f, "request {}: GET {}", id, resource),
            ClientEvent::Response { id, status } => write!(f, "request {}: status {}", id, status),
            ClientEvent::Error { id, error } => write!(f, "request {}: {}", id, error),
            ClientEvent::VersionFallback { from, to } => write!(
                f,
                "API version {} unauthorized, falling back to {}",
                from.path(),
                to.path()
            ),
        }
    }
}

/// Connection settings for the provider
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme and host, e.g. `https://api.openweathermap.org`
    pub base_url: String,
    /// API key appended to every request
    pub api_key: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Extra attempts after a network failure
    pub max_retries: u32,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: 1,
        }
    }
}

/// Client for the OpenWeatherMap data and geocoding APIs
///
/// Only one request is in flight at a time; further callers queue in FIFO
/// order behind it.
pub struct WeatherClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    slot: Semaphore,
    legacy: AtomicBool,
    next_id: AtomicU64,
}

impl fmt::Debug for WeatherClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherClient")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .field("api_version", &self.api_version())
            .finish()
    }
}

impl WeatherClient {
    /// Create a client using reqwest
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    /// Create a client with a custom transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config,
            slot: Semaphore::new(1),
            legacy: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    /// Data API version currently in use
    pub fn api_version(&self) -> ApiVersion {
        if self.legacy.load(Ordering::SeqCst) {
            ApiVersion::Legacy
        } else {
            ApiVersion::Current
        }
    }

    /// Fetch combined current, hourly and daily conditions
    pub async fn fetch_onecall(&self, latitude: f64, longitude: f64) -> Result<Value, WeatherError> {
        self.get_data(
            "onecall",
            &[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("exclude", "minutely,alerts".to_string()),
            ],
        )
        .await
    }

    /// Look up current weather, used to resolve city ids
    ///
    /// This endpoint only exists on the legacy data API. Its 401s surface as
    /// they are and never switch the One Call version.
    pub async fn fetch_current_weather(
        &self,
        query: &[(&str, String)],
    ) -> Result<Value, WeatherError> {
        self.get(&format!("data/{}/weather", ApiVersion::Legacy.path()), query)
            .await
    }

    /// GET a One Call resource on the versioned data API
    ///
    /// A 401 on the current version switches to the legacy version for the
    /// rest of the process lifetime and retries once there.
    async fn get_data(
        &self,
        resource: &str,
        query: &[(&str, String)],
    ) -> Result<Value, WeatherError> {
        loop {
            let version = self.api_version();
            let path = format!("data/{}/{}", version.path(), resource);
            match self.get(&path, query).await {
                Err(WeatherError::Provider {
                    kind: ProviderErrorKind::Unauthorized,
                    ..
                }) if version == ApiVersion::Current => {
                    if !self.legacy.swap(true, Ordering::SeqCst) {
                        self.emit(ClientEvent::VersionFallback {
                            from: ApiVersion::Current,
                            to: ApiVersion::Legacy,
                        });
                    }
                }
                result => return result,
            }
        }
    }

    /// GET a resource on the geocoding API
    pub async fn get_geo(
        &self,
        resource: &str,
        query: &[(&str, String)],
    ) -> Result<Value, WeatherError> {
        self.get(&format!("geo/1.0/{}", resource), query).await
    }

    /// GET `path` with `query`, appending the API key and metric units
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, WeatherError> {
        let mut params: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_str())).collect();
        params.push(("units", "metric"));
        let resource = format!("/{}?{}", path, encode_query(&params)?);
        params.push(("appid", self.config.api_key.as_str()));
        let endpoint = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let url = Url::parse_with_params(&endpoint, &params)
            .map_err(|e| WeatherError::InvalidUrl(e.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _permit = self
            .slot
            .acquire()
            .await
            .map_err(|_| WeatherError::Network("request slot closed".to_string()))?;

        let mut attempt = 0;
        let response = loop {
            self.emit(ClientEvent::Request {
                id,
                resource: resource.clone(),
            });
            match self.transport.get(url.as_str(), self.config.timeout).await {
                Ok(response) => break response,
                Err(error @ WeatherError::Network(_)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    self.emit(ClientEvent::Error {
                        id,
                        error: format!("{}, retrying", error),
                    });
                }
                Err(error) => {
                    self.emit(ClientEvent::Error {
                        id,
                        error: error.to_string(),
                    });
                    return Err(error);
                }
            }
        };
        self.emit(ClientEvent::Response {
            id,
            status: response.status,
        });

        let result = classify_response(response);
        if let Err(error) = &result {
            self.emit(ClientEvent::Error {
                id,
                error: error.to_string(),
            });
        }
        result
    }

    fn emit(&self, event: ClientEvent) {
        match event {
            ClientEvent::Error { .. } | ClientEvent::VersionFallback { .. } => {
                warn!("{}", event)
            }
            _ => debug!("{}", event),
        }
    }
}

fn encode_query(params: &[(&str, &str)]) -> Result<String, WeatherError> {
    let url = Url::parse_with_params("http://localhost/", params)
        .map_err(|e| WeatherError::InvalidUrl(e.to_string()))?;
    Ok(url.query().unwrap_or_default().to_string())
}

/// Turn a raw response into JSON or a classified provider error
fn classify_response(response: HttpResponse) -> Result<Value, WeatherError> {
    if response.status != 200 {
        let message = serde_json::from_str::<Value>(&response.body)
            .ok()
            .and_then(|body| provider_message(&body))
            .unwrap_or_else(|| response.body.trim().to_string());
        return Err(WeatherError::Provider {
            kind: ProviderErrorKind::from_status(response.status),
            status: response.status,
            message,
        });
    }

    let body: Value = serde_json::from_str(&response.body)?;
    if let Some(code) = embedded_code(&body) {
        if code != 200 {
            return Err(WeatherError::Provider {
                kind: ProviderErrorKind::from_status(code),
                status: code,
                message: provider_message(&body).unwrap_or_default(),
            });
        }
    }
    Ok(body)
}

/// The provider's `cod` field, which is sometimes a number and sometimes a string
fn embedded_code(body: &Value) -> Option<u16> {
    match body.get("cod")? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn provider_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn client(transport: Arc<ScriptedTransport>) -> WeatherClient {
        WeatherClient::with_transport(ClientConfig::new("secret"), transport)
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(ProviderErrorKind::from_status(401), ProviderErrorKind::Unauthorized);
        assert_eq!(ProviderErrorKind::from_status(404), ProviderErrorKind::NotFound);
        assert_eq!(ProviderErrorKind::from_status(429), ProviderErrorKind::RateLimited);
        assert_eq!(ProviderErrorKind::from_status(500), ProviderErrorKind::Other);
    }

    #[test]
    fn test_classify_embedded_error_in_200_body() {
        let response = HttpResponse {
            status: 200,
            body: r#"{"cod": "404", "message": "city not found"}"#.to_string(),
        };
        match classify_response(response) {
            Err(WeatherError::Provider {
                kind,
                status,
                message,
            }) => {
                assert_eq!(kind, ProviderErrorKind::NotFound);
                assert_eq!(status, 404);
                assert_eq!(message, "city not found");
            }
            other => panic!("Expected provider error, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_success_with_numeric_cod() {
        let response = HttpResponse {
            status: 200,
            body: r#"{"cod": 200, "name": "Utrecht"}"#.to_string(),
        };
        let body = classify_response(response).expect("Should succeed");
        assert_eq!(body["name"], "Utrecht");
    }

    #[test]
    fn test_classify_non_json_body() {
        let response = HttpResponse {
            status: 200,
            body: "<html>".to_string(),
        };
        assert!(matches!(
            classify_response(response),
            Err(WeatherError::InvalidJson(_))
        ));
    }

    #[tokio::test]
    async fn test_get_appends_key_and_units() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(200, "{}");
        let client = client(transport.clone());

        client
            .fetch_current_weather(&[("q", "De Bilt".to_string())])
            .await
            .expect("Request should succeed");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let url = &requests[0];
        assert!(url.starts_with("https://api.openweathermap.org/data/2.5/weather?"));
        assert!(url.contains("q=De+Bilt"));
        assert!(url.contains("units=metric"));
        assert!(url.contains("appid=secret"));
    }

    #[tokio::test]
    async fn test_unauthorized_falls_back_to_legacy_version() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(401, r#"{"cod": 401, "message": "Invalid API key"}"#);
        transport.push_ok(200, r#"{"current": {}}"#);
        let client = client(transport.clone());

        let body = client
            .fetch_onecall(52.1, 5.18)
            .await
            .expect("Fallback should succeed");
        assert!(body.get("current").is_some());
        assert_eq!(client.api_version(), ApiVersion::Legacy);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].contains("/data/3.0/onecall"));
        assert!(requests[1].contains("/data/2.5/onecall"));

        // The fallback persists for later requests
        transport.push_ok(200, "{}");
        client.fetch_onecall(52.1, 5.18).await.expect("Should succeed");
        assert!(transport.requests()[2].contains("/data/2.5/onecall"));
    }

    #[tokio::test]
    async fn test_current_weather_unauthorized_keeps_onecall_version() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(401, r#"{"cod": 401, "message": "Invalid API key"}"#);
        transport.push_ok(200, r#"{"current": {}}"#);
        let client = client(transport.clone());

        let error = client
            .fetch_current_weather(&[("id", "2757783".to_string())])
            .await
            .unwrap_err();
        assert_eq!(error.provider_kind(), Some(ProviderErrorKind::Unauthorized));
        assert_eq!(client.api_version(), ApiVersion::Current);

        client.fetch_onecall(52.1, 5.18).await.expect("Should succeed");
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].contains("/data/2.5/weather?id=2757783"));
        assert!(requests[1].contains("/data/3.0/onecall?"));
    }

    #[tokio::test]
    async fn test_unauthorized_on_legacy_version_surfaces() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(401, r#"{"cod": 401, "message": "Invalid API key"}"#);
        transport.push_ok(401, r#"{"cod": 401, "message": "Invalid API key"}"#);
        let client = client(transport.clone());

        let error = client.fetch_onecall(52.1, 5.18).await.unwrap_err();
        assert_eq!(error.provider_kind(), Some(ProviderErrorKind::Unauthorized));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_network_error_is_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_network_error("connection reset");
        transport.push_ok(200, "{}");
        let client = client(transport.clone());

        client.fetch_onecall(52.1, 5.18).await.expect("Retry should succeed");
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_network_error_surfaces_after_retries() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_network_error("timed out");
        transport.push_network_error("timed out");
        let client = client(transport.clone());

        let error = client.fetch_current_weather(&[]).await.unwrap_err();
        assert!(matches!(error, WeatherError::Network(_)));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(404, r#"{"cod": "404", "message": "city not found"}"#);
        let client = client(transport.clone());

        let error = client.fetch_current_weather(&[]).await.unwrap_err();
        assert_eq!(error.provider_kind(), Some(ProviderErrorKind::NotFound));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_requests_are_serialised() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..4 {
            transport.push_ok(200, "{}");
        }
        let client = Arc::new(client(transport.clone()));

        let calls = (0..4).map(|_| {
            let client = client.clone();
            async move { client.fetch_current_weather(&[]).await }
        });
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(transport.max_in_flight(), 1);
    }

    #[test]
    fn test_event_display() {
        let event = ClientEvent::VersionFallback {
            from: ApiVersion::Current,
            to: ApiVersion::Legacy,
        };
        assert_eq!(
            event.to_string(),
            "API version 3.0 unauthorized, falling back to 2.5"
        );
    }
}
