//! Characteristic values and the per-sensor value bag

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// A typed characteristic value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
    Enum(u8),
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Enum(e) => write!(f, "#{}", e),
        }
    }
}

/// Static description of one characteristic
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicSpec {
    /// Stable key, e.g. "temperature"
    pub key: &'static str,
    /// Display unit, if any
    pub unit: Option<&'static str>,
    /// Valid numeric range; numbers outside it are clamped
    pub range: Option<(f64, f64)>,
    /// Initial value
    pub default: Value,
}

impl CharacteristicSpec {
    pub fn new(key: &'static str, default: impl Into<Value>) -> Self {
        Self {
            key,
            unit: None,
            range: None,
            default: default.into(),
        }
    }

    pub fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }
}

/// Live characteristic values of one sensor
///
/// The key set is fixed by the schema the bag was built from. Writes to an
/// unknown key are ignored. Changed keys are remembered until
/// `take_changes` is called.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueBag {
    values: BTreeMap<&'static str, Value>,
    ranges: BTreeMap<&'static str, (f64, f64)>,
    changed: Vec<&'static str>,
}

impl ValueBag {
    /// Build a bag holding each characteristic's default
    pub fn from_schema(schema: &[CharacteristicSpec]) -> Self {
        Self {
            values: schema
                .iter()
                .map(|spec| (spec.key, spec.default.clone()))
                .collect(),
            ranges: schema
                .iter()
                .filter_map(|spec| spec.range.map(|range| (spec.key, range)))
                .collect(),
            changed: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Set a value, clamping numbers to the characteristic's range
    ///
    /// Returns `true` if the stored value changed.
    pub fn set(&mut self, key: &'static str, value: impl Into<Value>) -> bool {
        let mut value = value.into();
        if let (Value::Number(n), Some((min, max))) = (&value, self.ranges.get(key)) {
            value = Value::Number(n.clamp(*min, *max));
        }
        let Some(slot) = self.values.get_mut(key) else {
            return false;
        };
        if *slot == value {
            return false;
        }
        *slot = value;
        if !self.changed.contains(&key) {
            self.changed.push(key);
        }
        true
    }

    /// Drain the keys changed since the last call, with their current values
    pub fn take_changes(&mut self) -> Vec<(&'static str, Value)> {
        std::mem::take(&mut self.changed)
            .into_iter()
            .filter_map(|key| self.values.get(key).map(|value| (key, value.clone())))
            .collect()
    }
}
