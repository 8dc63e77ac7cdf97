//! Sensor projections and their characteristic values
//!
//! A location exposes a set of sensors. Each one is a `SensorProjection`
//! of a given `SensorKind`, holding a `ValueBag` derived from the latest
//! observation.

mod projection;
mod value;

pub use projection::{format_time, SensorKind, SensorProjection, HEARTRATE_MINUTES_RANGE};
pub use value::{CharacteristicSpec, Value, ValueBag};
