//! Sensor projections
//!
//! Each `SensorKind` owns a fixed characteristic schema and a derivation
//! from an `Observation` into its `ValueBag`. Derivations are pure with
//! respect to the observation: rerunning one with the same input leaves the
//! bag unchanged.

use chrono::{DateTime, Local, Utc};

use super::value::{CharacteristicSpec, Value, ValueBag};
use crate::data::classify::{condition_text, PressureTrend};
use crate::data::{Conditions, Observation};

/// Temperature display unit published alongside the temperature (Celsius)
const TEMPERATURE_UNIT_CELSIUS: u8 = 0;

/// Range of the settable polling interval, in minutes (10 s to 2 h)
pub const HEARTRATE_MINUTES_RANGE: (f64, f64) = (10.0 / 60.0, 120.0);

/// Heartrate shown before a tracker publishes its own, in minutes
const DEFAULT_HEARTRATE_MINUTES: f64 = 10.0;

/// The sensors a location can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Temperature,
    Humidity,
    AirPressure,
    /// Motion-style alert that trips while it rains or snows
    Rain,
    /// Leak-style alert that trips while it rains or snows
    Leak,
    /// Aggregate of the current conditions
    Weather,
    /// Forecast for `hourly[n]`
    HourlyForecast(usize),
    /// Forecast for `daily[n]`
    DailyForecast(usize),
}

impl SensorKind {
    /// Service label, appended to the device name
    pub fn label(&self) -> String {
        match self {
            SensorKind::Temperature => "Temperature".to_string(),
            SensorKind::Humidity => "Humidity".to_string(),
            SensorKind::AirPressure => "Air Pressure".to_string(),
            SensorKind::Rain => "Rain".to_string(),
            SensorKind::Leak => "Leak".to_string(),
            SensorKind::Weather => "Weather".to_string(),
            SensorKind::HourlyForecast(hour) => format!("Forecast +{}h", hour),
            SensorKind::DailyForecast(day) => format!("Forecast Day {}", day),
        }
    }

    /// Characteristic schema for this sensor
    pub fn schema(&self) -> Vec<CharacteristicSpec> {
        match self {
            SensorKind::Temperature => temperature_schema(),
            SensorKind::Humidity => humidity_schema(),
            SensorKind::AirPressure => air_pressure_schema(),
            SensorKind::Rain => alert_schema("motion"),
            SensorKind::Leak => alert_schema("leak"),
            SensorKind::Weather => {
                let mut schema = summary_schema();
                schema.push(
                    CharacteristicSpec::new("heartrate", DEFAULT_HEARTRATE_MINUTES)
                        .unit("min")
                        .range(HEARTRATE_MINUTES_RANGE.0, HEARTRATE_MINUTES_RANGE.1),
                );
                schema
            }
            SensorKind::HourlyForecast(_) | SensorKind::DailyForecast(_) => {
                let mut schema = temperature_schema();
                schema.extend(humidity_schema());
                schema.extend(air_pressure_schema());
                schema.extend(
                    summary_schema()
                        .into_iter()
                        .filter(|spec| !matches!(spec.key, "temperatureMin" | "temperatureMax" | "apparentTemperature")),
                );
                schema
            }
        }
    }
}

fn temperature_schema() -> Vec<CharacteristicSpec> {
    vec![
        CharacteristicSpec::new("temperature", 0.0)
            .unit("°C")
            .range(-270.0, 100.0),
        CharacteristicSpec::new("temperatureMin", 0.0)
            .unit("°C")
            .range(-270.0, 100.0),
        CharacteristicSpec::new("temperatureMax", 0.0)
            .unit("°C")
            .range(-270.0, 100.0),
        CharacteristicSpec::new("apparentTemperature", 0.0)
            .unit("°C")
            .range(-270.0, 100.0),
        CharacteristicSpec::new("temperatureUnit", Value::Enum(TEMPERATURE_UNIT_CELSIUS)),
    ]
}

fn humidity_schema() -> Vec<CharacteristicSpec> {
    vec![CharacteristicSpec::new("humidity", 0.0)
        .unit("%")
        .range(0.0, 100.0)]
}

fn air_pressure_schema() -> Vec<CharacteristicSpec> {
    vec![
        CharacteristicSpec::new("pressure", 1013.0)
            .unit("hPa")
            .range(700.0, 1100.0),
        CharacteristicSpec::new("elevation", 0.0).unit("m"),
        CharacteristicSpec::new("trend", Value::Enum(PressureTrend::Blank.code())),
    ]
}

fn alert_schema(key: &'static str) -> Vec<CharacteristicSpec> {
    vec![
        CharacteristicSpec::new(key, false),
        CharacteristicSpec::new("lastActivation", 0.0).unit("s"),
    ]
}

fn summary_schema() -> Vec<CharacteristicSpec> {
    vec![
        CharacteristicSpec::new("apparentTemperature", 0.0)
            .unit("°C")
            .range(-270.0, 100.0),
        CharacteristicSpec::new("clouds", 0.0).unit("%").range(0.0, 100.0),
        CharacteristicSpec::new("condition", ""),
        CharacteristicSpec::new("conditionCategory", 0.0),
        CharacteristicSpec::new("dewPoint", 0.0)
            .unit("°C")
            .range(-270.0, 100.0),
        CharacteristicSpec::new("observationTime", ""),
        CharacteristicSpec::new("rain", false),
        CharacteristicSpec::new("rain1h", 0.0).unit("mm"),
        CharacteristicSpec::new("rain24h", 0.0).unit("mm"),
        CharacteristicSpec::new("snow", false),
        CharacteristicSpec::new("sunrise", ""),
        CharacteristicSpec::new("sunset", ""),
        CharacteristicSpec::new("temperatureMin", 0.0)
            .unit("°C")
            .range(-270.0, 100.0),
        CharacteristicSpec::new("temperatureMax", 0.0)
            .unit("°C")
            .range(-270.0, 100.0),
        CharacteristicSpec::new("uvIndex", 0.0).range(0.0, 20.0),
        CharacteristicSpec::new("visibility", 0.0).unit("km"),
        CharacteristicSpec::new("windDirection", ""),
        CharacteristicSpec::new("windSpeed", 0.0).unit("km/h"),
    ]
}

/// Format a timestamp the way the accessory displays it, in local time
pub fn format_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%a %b %d %Y %H:%M:%S")
        .to_string()
}

/// One sensor of a location: its kind, display name and live values
#[derive(Debug, Clone)]
pub struct SensorProjection {
    kind: SensorKind,
    name: String,
    schema: Vec<CharacteristicSpec>,
    bag: ValueBag,
}

impl SensorProjection {
    /// Create a projection with its bag at the schema defaults
    pub fn new(kind: SensorKind, device_name: &str) -> Self {
        let schema = kind.schema();
        let bag = ValueBag::from_schema(&schema);
        Self {
            kind,
            name: format!("{} {}", device_name, kind.label()),
            schema,
            bag,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &[CharacteristicSpec] {
        &self.schema
    }

    pub fn bag(&self) -> &ValueBag {
        &self.bag
    }

    pub fn bag_mut(&mut self) -> &mut ValueBag {
        &mut self.bag
    }

    /// Drain changed values for publishing
    pub fn take_changes(&mut self) -> Vec<(&'static str, Value)> {
        self.bag.take_changes()
    }

    /// Update the bag from an observation
    ///
    /// Forecast projections whose index lies beyond the provider's forecast
    /// window leave their bag untouched.
    pub fn project(&mut self, observation: &Observation) {
        let bag = &mut self.bag;
        match self.kind {
            SensorKind::Temperature => {
                project_temperature(bag, &observation.current, observation.today())
            }
            SensorKind::Humidity => project_humidity(bag, &observation.current),
            SensorKind::AirPressure => project_air_pressure(bag, &observation.current),
            SensorKind::Rain => project_alert(bag, "motion", &observation.current),
            SensorKind::Leak => project_alert(bag, "leak", &observation.current),
            SensorKind::Weather => {
                project_summary(bag, &observation.current, observation.today())
            }
            SensorKind::HourlyForecast(hour) => {
                if let Some(conditions) = observation.hourly.get(hour) {
                    project_forecast(bag, conditions, None);
                }
            }
            SensorKind::DailyForecast(day) => {
                if let Some(conditions) = observation.daily.get(day) {
                    project_forecast(bag, conditions, Some(conditions));
                }
            }
        }
    }
}

fn project_temperature(bag: &mut ValueBag, conditions: &Conditions, day: Option<&Conditions>) {
    bag.set("temperature", conditions.temperature);
    bag.set("apparentTemperature", conditions.feels_like);
    project_min_max(bag, day);
}

fn project_min_max(bag: &mut ValueBag, day: Option<&Conditions>) {
    if let Some(day) = day {
        if let Some(min) = day.temperature_min {
            bag.set("temperatureMin", min);
        }
        if let Some(max) = day.temperature_max {
            bag.set("temperatureMax", max);
        }
    }
}

fn project_humidity(bag: &mut ValueBag, conditions: &Conditions) {
    bag.set("humidity", conditions.humidity);
}

fn project_air_pressure(bag: &mut ValueBag, conditions: &Conditions) {
    bag.set("pressure", conditions.pressure);
    bag.set(
        "trend",
        Value::Enum(PressureTrend::from_code(conditions.primary()).code()),
    );
}

fn project_alert(bag: &mut ValueBag, key: &'static str, conditions: &Conditions) {
    let active = conditions.rain || conditions.snow;
    let was_active = bag.boolean(key).unwrap_or(false);
    if active && !was_active {
        bag.set("lastActivation", conditions.observed_at.timestamp() as f64);
    }
    bag.set(key, active);
}

fn project_summary(bag: &mut ValueBag, conditions: &Conditions, day: Option<&Conditions>) {
    bag.set("apparentTemperature", conditions.feels_like);
    bag.set("clouds", conditions.clouds);
    bag.set("condition", condition_text(&conditions.weather));
    bag.set(
        "conditionCategory",
        conditions.primary().map(|code| f64::from(code.id)).unwrap_or(0.0),
    );
    bag.set("dewPoint", conditions.dew_point);
    bag.set("observationTime", format_time(conditions.observed_at));
    bag.set("rain", conditions.rain);
    bag.set("rain1h", conditions.rain_1h);
    bag.set(
        "rain24h",
        day.map(|day| day.rain_24h).unwrap_or(conditions.rain_24h),
    );
    bag.set("snow", conditions.snow);
    if let Some(sunrise) = conditions.sunrise {
        bag.set("sunrise", format_time(sunrise));
    }
    if let Some(sunset) = conditions.sunset {
        bag.set("sunset", format_time(sunset));
    }
    project_min_max(bag, day);
    bag.set("uvIndex", conditions.uv_index.max(0.0));
    if let Some(visibility) = conditions.visibility {
        bag.set("visibility", visibility);
    }
    bag.set("windDirection", conditions.wind_direction.as_str());
    bag.set("windSpeed", conditions.wind_speed);
}

fn project_forecast(bag: &mut ValueBag, conditions: &Conditions, day: Option<&Conditions>) {
    project_temperature(bag, conditions, day);
    project_humidity(bag, conditions);
    project_air_pressure(bag, conditions);
    project_summary(bag, conditions, day);
}
