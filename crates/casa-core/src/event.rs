//! Device events and inbound bridge messages

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DeviceId, ParameterId, Value};

/// A change observed on a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// A parameter took a new value
    ParameterChanged {
        device_id: DeviceId,
        parameter: String,
        parameter_id: ParameterId,
        value: Option<Value>,
    },

    EnabledChanged { device_id: DeviceId, enabled: bool },

    /// The device definition was merged with a republished one
    Updated { device_id: DeviceId },

    Added { device_id: DeviceId },

    Removed { device_id: DeviceId },
}

impl DeviceEvent {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            DeviceEvent::ParameterChanged { device_id, .. }
            | DeviceEvent::EnabledChanged { device_id, .. }
            | DeviceEvent::Updated { device_id }
            | DeviceEvent::Added { device_id }
            | DeviceEvent::Removed { device_id } => device_id,
        }
    }
}

/// Errors raised parsing an inbound bridge message
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BridgeEventError {
    #[error("bridge event is not an object")]
    NotAnObject,

    #[error("bridge event is missing field {0}")]
    MissingField(&'static str),

    #[error("unknown bridge event type: {0}")]
    UnknownType(String),
}

/// A message pushed by a bridge
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// `{TYPE: "PARAMETER", DEVICE, PARAMETER, VALUE}`
    Parameter {
        device: String,
        parameter: String,
        value: Value,
    },
}

impl BridgeEvent {
    /// Parse an inbound message
    ///
    /// A missing `VALUE` is read as null.
    pub fn parse(raw: &Value) -> Result<Self, BridgeEventError> {
        let obj = raw.as_object().ok_or(BridgeEventError::NotAnObject)?;
        let kind = obj
            .get("TYPE")
            .and_then(Value::as_str)
            .ok_or(BridgeEventError::MissingField("TYPE"))?;

        match kind {
            "PARAMETER" => {
                let device = obj
                    .get("DEVICE")
                    .and_then(Value::as_str)
                    .ok_or(BridgeEventError::MissingField("DEVICE"))?;
                let parameter = obj
                    .get("PARAMETER")
                    .and_then(Value::as_str)
                    .ok_or(BridgeEventError::MissingField("PARAMETER"))?;
                Ok(BridgeEvent::Parameter {
                    device: device.to_string(),
                    parameter: parameter.to_string(),
                    value: obj.get("VALUE").cloned().unwrap_or(Value::Null),
                })
            }
            other => Err(BridgeEventError::UnknownType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_parameter_event() {
        let raw = json!({"TYPE": "PARAMETER", "DEVICE": "d1", "PARAMETER": "On", "VALUE": true});
        assert_eq!(
            BridgeEvent::parse(&raw),
            Ok(BridgeEvent::Parameter {
                device: "d1".into(),
                parameter: "On".into(),
                value: json!(true),
            })
        );
    }

    #[test]
    fn test_missing_value_is_null() {
        let raw = json!({"TYPE": "PARAMETER", "DEVICE": "d1", "PARAMETER": "On"});
        let BridgeEvent::Parameter { value, .. } = BridgeEvent::parse(&raw).unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            BridgeEvent::parse(&json!([1])),
            Err(BridgeEventError::NotAnObject)
        );
        assert_eq!(
            BridgeEvent::parse(&json!({"TYPE": "PARAMETER", "PARAMETER": "On"})),
            Err(BridgeEventError::MissingField("DEVICE"))
        );
        assert_eq!(
            BridgeEvent::parse(&json!({"TYPE": "RULE"})),
            Err(BridgeEventError::UnknownType("RULE".into()))
        );
    }

    #[test]
    fn test_device_event_tagging() {
        let e = DeviceEvent::EnabledChanged {
            device_id: "d1".into(),
            enabled: false,
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "enabled_changed");
        assert_eq!(e.device_id().as_str(), "d1");
    }
}
