//! Parameter definitions and value normalization
//!
//! A parameter is a named, typed attribute of a device: a sensor reading
//! (read-only telemetry) or an actuatable setting. Values arriving from
//! bridges, rules or storage come in many shapes (strings, numbers, lists);
//! [`Parameter::normalize`] turns them into one canonical [`Value`] per
//! type and [`Parameter::unnormalize`] renders them back.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{ParameterId, Value};

/// Errors raised by strict value conversion
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValueError {
    #[error("value {value} cannot be converted to {expected:?}")]
    Incompatible {
        expected: ParameterType,
        value: String,
    },

    #[error("value '{value}' is not one of the allowed values of {parameter}")]
    NotAllowed { parameter: String, value: String },

    #[error("numeric value is not finite")]
    NotFinite,
}

/// Type tag of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterType {
    String,
    Boolean,
    Integer,
    Real,
    Time,
    Date,
    #[serde(rename = "DATETIME")]
    DateTime,
    /// One of a fixed set of values
    Enum,
    /// Subset of an enumeration or free set of strings
    Set,
    Color,
    /// Set of active calendar events
    Events,
    #[serde(rename = "STRINGLIST")]
    StringList,
    /// Holder of sub-parameters
    Object,
}

/// A named, typed device attribute
///
/// Two parameters compare equal when their definitions match; the
/// [`ParameterId`] is deliberately left out of the comparison, it is the
/// identity used to key stored values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(skip)]
    id: ParameterId,

    #[serde(rename = "NAME")]
    name: String,

    #[serde(rename = "LABEL", default, skip_serializing_if = "String::is_empty")]
    label: String,

    #[serde(rename = "DESCRIPTION", default, skip_serializing_if = "String::is_empty")]
    description: String,

    #[serde(rename = "TYPE")]
    parameter_type: ParameterType,

    #[serde(rename = "ISSENSOR", default)]
    is_sensor: bool,

    #[serde(rename = "MIN", default, skip_serializing_if = "Option::is_none")]
    min: Option<f64>,

    #[serde(rename = "MAX", default, skip_serializing_if = "Option::is_none")]
    max: Option<f64>,

    #[serde(rename = "VALUES", default, skip_serializing_if = "Vec::is_empty")]
    values: Vec<String>,

    #[serde(rename = "UNITS", default, skip_serializing_if = "Option::is_none")]
    units: Option<String>,
}

impl Parameter {
    /// Create a parameter of the given type with no range or value restrictions
    pub fn new(name: impl Into<String>, parameter_type: ParameterType) -> Self {
        Self {
            id: ParameterId::new(),
            name: name.into(),
            label: String::new(),
            description: String::new(),
            parameter_type,
            is_sensor: false,
            min: None,
            max: None,
            values: Vec::new(),
            units: None,
        }
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::Boolean)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::String)
    }

    pub fn integer(name: impl Into<String>, min: i64, max: i64) -> Self {
        let mut p = Self::new(name, ParameterType::Integer);
        p.min = Some(min as f64);
        p.max = Some(max as f64);
        p
    }

    pub fn real(name: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        let mut p = Self::new(name, ParameterType::Real);
        p.min = min;
        p.max = max;
        p
    }

    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut p = Self::new(name, ParameterType::Enum);
        p.values = values.into_iter().map(Into::into).collect();
        p
    }

    pub fn set<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut p = Self::new(name, ParameterType::Set);
        p.values = values.into_iter().map(Into::into).collect();
        p
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Mark this parameter as read-only telemetry
    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    /// Give this parameter a new identity
    ///
    /// Used when a definition is adopted by a device, so that two devices
    /// built from one definition never share stored values.
    pub fn with_fresh_id(mut self) -> Self {
        self.id = ParameterId::new();
        self
    }

    pub fn id(&self) -> ParameterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display label, falling back to the name
    pub fn label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameter_type(&self) -> ParameterType {
        self.parameter_type
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn set_is_sensor(&mut self, is_sensor: bool) {
        self.is_sensor = is_sensor;
    }

    pub fn min_value(&self) -> Option<f64> {
        self.min
    }

    pub fn max_value(&self) -> Option<f64> {
        self.max
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    /// Merge the mutable fields of `other` into this parameter
    ///
    /// Name, type and identity are kept. Returns true if anything changed.
    pub fn update(&mut self, other: &Parameter) -> bool {
        let mut changed = false;
        if self.label != other.label {
            self.label = other.label.clone();
            changed = true;
        }
        if self.description != other.description {
            self.description = other.description.clone();
            changed = true;
        }
        if self.is_sensor != other.is_sensor {
            self.is_sensor = other.is_sensor;
            changed = true;
        }
        if self.min != other.min || self.max != other.max {
            self.min = other.min;
            self.max = other.max;
            changed = true;
        }
        if self.values != other.values {
            self.values = other.values.clone();
            changed = true;
        }
        if self.units != other.units {
            self.units = other.units.clone();
            changed = true;
        }
        changed
    }

    /// Convert an external value to its canonical form
    ///
    /// Values that cannot be converted normalize to null.
    pub fn normalize(&self, value: &Value) -> Value {
        match self.try_normalize(value) {
            Ok(v) => v,
            Err(e) => {
                debug!(parameter = %self.name, error = %e, "Value normalized to null");
                Value::Null
            }
        }
    }

    /// Convert an external value to its canonical form, reporting failures
    pub fn try_normalize(&self, value: &Value) -> Result<Value, ValueError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self.parameter_type {
            ParameterType::Boolean => to_bool(value).map(Value::Bool),
            ParameterType::Integer => {
                let n = to_f64(value).ok_or_else(|| self.incompatible(value))?;
                Ok(Value::from(self.clamp(n.round()) as i64))
            }
            ParameterType::Real => {
                let n = to_f64(value).ok_or_else(|| self.incompatible(value))?;
                serde_json::Number::from_f64(self.clamp(n))
                    .map(Value::Number)
                    .ok_or(ValueError::NotFinite)
            }
            ParameterType::String => Ok(Value::String(scalar_string(value))),
            ParameterType::Enum => {
                let s = scalar_string(value);
                self.allowed(&s).map(Value::String)
            }
            ParameterType::Set => {
                let mut items: Vec<String> = Vec::new();
                for item in string_items(value) {
                    let item = self.allowed(&item)?;
                    if !items.contains(&item) {
                        items.push(item);
                    }
                }
                Ok(Value::from(items))
            }
            ParameterType::StringList => Ok(Value::from(string_items(value))),
            ParameterType::Color => to_color(value).ok_or_else(|| self.incompatible(value)),
            ParameterType::Time | ParameterType::Date | ParameterType::DateTime => {
                to_millis(value).map(Value::from).ok_or_else(|| self.incompatible(value))
            }
            ParameterType::Events => match value {
                Value::Array(_) => Ok(value.clone()),
                _ => Err(self.incompatible(value)),
            },
            ParameterType::Object => match value {
                Value::Object(_) => Ok(value.clone()),
                _ => Err(self.incompatible(value)),
            },
        }
    }

    /// Render a canonical value in its external string form
    pub fn unnormalize(&self, value: &Value) -> String {
        match (self.parameter_type, value) {
            (_, Value::Null) => String::new(),
            (ParameterType::Set | ParameterType::StringList, Value::Array(items)) => items
                .iter()
                .map(scalar_string)
                .collect::<Vec<_>>()
                .join(","),
            (_, v) => scalar_string(v),
        }
    }

    fn clamp(&self, mut n: f64) -> f64 {
        if let Some(min) = self.min {
            n = n.max(min);
        }
        if let Some(max) = self.max {
            n = n.min(max);
        }
        n
    }

    fn allowed(&self, candidate: &str) -> Result<String, ValueError> {
        if self.values.is_empty() {
            return Ok(candidate.to_string());
        }
        self.values
            .iter()
            .find(|v| v.eq_ignore_ascii_case(candidate.trim()))
            .cloned()
            .ok_or_else(|| ValueError::NotAllowed {
                parameter: self.name.clone(),
                value: candidate.to_string(),
            })
    }

    fn incompatible(&self, value: &Value) -> ValueError {
        ValueError::Incompatible {
            expected: self.parameter_type,
            value: value.to_string(),
        }
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.label == other.label
            && self.description == other.description
            && self.parameter_type == other.parameter_type
            && self.is_sensor == other.is_sensor
            && self.min == other.min
            && self.max == other.max
            && self.values == other.values
            && self.units == other.units
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_items(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(scalar_string)
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        other => vec![scalar_string(other)],
    }
}

fn to_bool(value: &Value) -> Result<bool, ValueError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "on" | "yes" | "y" | "1" => Ok(true),
            "false" | "f" | "off" | "no" | "n" | "0" | "" => Ok(false),
            _ => Err(ValueError::Incompatible {
                expected: ParameterType::Boolean,
                value: s.clone(),
            }),
        },
        other => Err(ValueError::Incompatible {
            expected: ParameterType::Boolean,
            value: other.to_string(),
        }),
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn to_color(value: &Value) -> Option<Value> {
    let s = value.as_str()?.trim();
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(Value::String(format!("#{}", hex.to_ascii_lowercase())))
}

fn to_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.timestamp_millis()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boolean_normalization() {
        let p = Parameter::boolean("On");
        assert_eq!(p.normalize(&json!("on")), json!(true));
        assert_eq!(p.normalize(&json!("FALSE")), json!(false));
        assert_eq!(p.normalize(&json!(1)), json!(true));
        assert_eq!(p.normalize(&json!("maybe")), Value::Null);
        assert_eq!(p.unnormalize(&json!(true)), "true");
    }

    #[test]
    fn test_integer_is_rounded_and_clamped() {
        let p = Parameter::integer("Level", 0, 100);
        assert_eq!(p.normalize(&json!("42")), json!(42));
        assert_eq!(p.normalize(&json!(41.6)), json!(42));
        assert_eq!(p.normalize(&json!(250)), json!(100));
        assert_eq!(p.normalize(&json!(-3)), json!(0));
    }

    #[test]
    fn test_real_from_string() {
        let p = Parameter::real("Temperature", Some(-100.0), Some(160.0));
        assert_eq!(p.normalize(&json!("21.5")), json!(21.5));
        assert_eq!(p.normalize(&json!(500)), json!(160.0));
        assert!(p.try_normalize(&json!("warm")).is_err());
    }

    #[test]
    fn test_enum_matches_case_insensitively() {
        let p = Parameter::enumeration("Condition", ["Clear", "Cloudy", "Rain"]);
        assert_eq!(p.normalize(&json!("cloudy")), json!("Cloudy"));
        assert_eq!(
            p.try_normalize(&json!("Hail")),
            Err(ValueError::NotAllowed {
                parameter: "Condition".into(),
                value: "Hail".into()
            })
        );
    }

    #[test]
    fn test_set_accepts_comma_string() {
        let p = Parameter::set("Modes", ["Away", "Home", "Night"]);
        assert_eq!(p.normalize(&json!("home, night,home")), json!(["Home", "Night"]));
        assert_eq!(p.unnormalize(&json!(["Home", "Night"])), "Home,Night");
    }

    #[test]
    fn test_color_and_datetime() {
        let c = Parameter::new("Color", ParameterType::Color);
        assert_eq!(c.normalize(&json!("FF8800")), json!("#ff8800"));
        assert_eq!(c.normalize(&json!("orange")), Value::Null);

        let d = Parameter::new("When", ParameterType::DateTime);
        assert_eq!(
            d.normalize(&json!("2024-01-01T00:00:00Z")),
            json!(1_704_067_200_000i64)
        );
        assert_eq!(d.normalize(&json!(5)), json!(5));
    }

    #[test]
    fn test_null_is_preserved() {
        let p = Parameter::string("Text");
        assert_eq!(p.normalize(&Value::Null), Value::Null);
        assert_eq!(p.normalize(&json!(12)), json!("12"));
    }

    #[test]
    fn test_update_keeps_identity() {
        let mut old = Parameter::real("Temperature", Some(0.0), Some(100.0));
        let id = old.id();
        let new = Parameter::real("Temperature", Some(-40.0), Some(100.0)).with_units("C");

        assert!(old.update(&new));
        assert_eq!(old.id(), id);
        assert_eq!(old.min_value(), Some(-40.0));
        assert_eq!(old.units(), Some("C"));
        assert!(!old.update(&new));
        assert_eq!(old, new);
    }

    #[test]
    fn test_persisted_field_names() {
        let p = Parameter::enumeration("Condition", ["Clear"]).sensor();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["NAME"], "Condition");
        assert_eq!(json["TYPE"], "ENUM");
        assert_eq!(json["ISSENSOR"], true);

        let back: Parameter = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
        assert_ne!(back.id(), p.id());
    }
}
