//! Device definitions
//!
//! A [`DeviceDefinition`] is the plain-data description of a device as
//! persisted to storage or published by a bridge. Live devices are built
//! from definitions and merged with republished ones.

use casa_core::{DeviceId, Fields, Parameter, Transition, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{DeviceError, DeviceResult};

/// Persisted form of a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Stable identifier, generated when absent
    #[serde(rename = "UID", default = "DeviceId::generate")]
    pub id: DeviceId,

    #[serde(rename = "NAME", default)]
    pub name: String,

    #[serde(rename = "LABEL", default, skip_serializing_if = "String::is_empty")]
    pub label: String,

    #[serde(rename = "DESCRIPTION", default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Name of the owning bridge
    #[serde(rename = "BRIDGE", default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,

    #[serde(rename = "ENABLED", default = "enabled_default")]
    pub enabled: bool,

    #[serde(rename = "PARAMETERS", default)]
    pub parameters: Vec<Parameter>,

    #[serde(rename = "TRANSITIONS", default)]
    pub transitions: Vec<Transition>,

    #[serde(rename = "ISCALENDAR", default)]
    pub is_calendar: bool,
}

fn enabled_default() -> bool {
    true
}

impl DeviceDefinition {
    /// Create an empty definition with a freshly generated id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: DeviceId::generate(),
            name: name.into(),
            label: String::new(),
            description: String::new(),
            bridge: None,
            enabled: true,
            parameters: Vec::new(),
            transitions: Vec::new(),
            is_calendar: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<DeviceId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_bridge(mut self, bridge: impl Into<String>) -> Self {
        self.bridge = Some(bridge.into());
        self
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn calendar(mut self, is_calendar: bool) -> Self {
        self.is_calendar = is_calendar;
        self
    }

    /// Parse and validate a persisted record
    pub fn from_fields(fields: &Fields) -> DeviceResult<Self> {
        let definition: DeviceDefinition =
            serde_json::from_value(Value::Object(fields.clone()))
                .map_err(|e| DeviceError::Invalid(e.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn to_fields(&self) -> Fields {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            _ => Fields::new(),
        }
    }

    /// A definition is valid with a non-empty id and name
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> DeviceResult<()> {
        if self.id.is_empty() {
            return Err(DeviceError::Invalid("missing UID".into()));
        }
        if self.name.trim().is_empty() {
            return Err(DeviceError::Invalid(format!("device {} has no name", self.id)));
        }

        let mut names = HashSet::new();
        for p in &self.parameters {
            if !names.insert(p.name()) {
                return Err(DeviceError::Invalid(format!(
                    "duplicate parameter {} on device {}",
                    p.name(),
                    self.id
                )));
            }
        }
        let mut names = HashSet::new();
        for t in &self.transitions {
            if !names.insert(t.name()) {
                return Err(DeviceError::Invalid(format!(
                    "duplicate transition {} on device {}",
                    t.name(),
                    self.id
                )));
            }
        }
        Ok(())
    }
}
