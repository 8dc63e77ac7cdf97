//! Interface to the home-automation host
//!
//! The host owns the accessory object model. Trackers register one device
//! per location, publish changed characteristic values and unregister the
//! device when the location goes away.

use log::{debug, info};

use crate::sensors::{CharacteristicSpec, SensorProjection, Value};

/// Manufacturer reported for every device
pub const MANUFACTURER: &str = "wsbridge";

/// Model reported for every device
pub const MODEL: &str = "OpenWeatherMap";

/// Identity of the per-location device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Stable id derived from the location key
    pub id: String,
    /// Display name
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub firmware: &'static str,
}

impl DeviceInfo {
    /// Device for a location key, e.g. "De Bilt,NL" becomes `WS-DEBILTNL`
    pub fn for_location(location: &str) -> Self {
        let suffix: String = location
            .to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        Self {
            id: format!("WS-{}", suffix),
            name: location.to_string(),
            manufacturer: MANUFACTURER,
            model: MODEL,
            firmware: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// A service exposed by a device, as announced at registration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub characteristics: Vec<CharacteristicSpec>,
}

impl From<&SensorProjection> for ServiceDescriptor {
    fn from(sensor: &SensorProjection) -> Self {
        Self {
            name: sensor.name().to_string(),
            characteristics: sensor.schema().to_vec(),
        }
    }
}

/// Accessory operations the core needs from the host
pub trait AccessoryHost: Send + Sync {
    /// Announce a device and its services
    fn register(&self, device: &DeviceInfo, services: &[ServiceDescriptor]);

    /// Withdraw a device
    fn unregister(&self, device_id: &str);

    /// Publish a characteristic value
    fn publish(&self, device_id: &str, service: &str, key: &str, value: &Value);
}

/// Host that writes accessory updates to the log
///
/// Registrations are logged at info level, value updates at debug level.
#[derive(Debug, Default)]
pub struct LogHost;

impl AccessoryHost for LogHost {
    fn register(&self, device: &DeviceInfo, services: &[ServiceDescriptor]) {
        info!(
            "{}: registered device {} with {} services",
            device.name,
            device.id,
            services.len()
        );
        for service in services {
            let keys: Vec<&str> = service.characteristics.iter().map(|c| c.key).collect();
            info!("{}: {} [{}]", device.name, service.name, keys.join(", "));
        }
    }

    fn unregister(&self, device_id: &str) {
        info!("unregistered device {}", device_id);
    }

    fn publish(&self, device_id: &str, service: &str, key: &str, value: &Value) {
        debug!("{} {}: {} = {}", device_id, service, key, value);
    }
}
