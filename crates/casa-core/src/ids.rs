//! Identifier types for devices and parameters

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Identity of a single parameter object
///
/// Assigned once when the parameter is constructed and never persisted.
/// The value store is keyed by this identity rather than by name, so two
/// devices exposing a parameter called `Temperature` never share a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterId(Ulid);

impl ParameterId {
    /// Allocate a fresh identity
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ParameterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ParameterId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

impl Serialize for ParameterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ParameterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Globally unique device identifier
///
/// Generated once when a device is first created and persisted under the
/// `UID` field afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_ids_are_distinct() {
        let a = ParameterId::new();
        let b = ParameterId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parameter_id_string_form() {
        let id = ParameterId::new();
        let json = serde_json::to_value(id).unwrap();
        let back: ParameterId = serde_json::from_value(json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_generated_device_ids() {
        let id = DeviceId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert_ne!(id, DeviceId::generate());
        assert_eq!(serde_json::to_value(&id).unwrap(), id.as_str());
    }
}
