//! Transition definitions
//!
//! A transition is an action a device can perform through its bridge
//! (switch on, set level, send a message). It declares the shape of the
//! values it accepts as a list of parameters plus optional defaults.

use serde::{Deserialize, Serialize};

use crate::{Fields, Parameter};

/// A named device action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    #[serde(rename = "NAME")]
    name: String,

    #[serde(rename = "LABEL", default, skip_serializing_if = "String::is_empty")]
    label: String,

    #[serde(rename = "DESCRIPTION", default, skip_serializing_if = "String::is_empty")]
    description: String,

    #[serde(rename = "PARAMETERS", default, skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<Parameter>,

    #[serde(rename = "DEFAULTS", default, skip_serializing_if = "Fields::is_empty")]
    defaults: Fields,
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
            description: String::new(),
            parameters: Vec::new(),
            defaults: Fields::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare an accepted value, optionally with a default
    pub fn with_parameter(mut self, parameter: Parameter, default: Option<crate::Value>) -> Self {
        if let Some(default) = default {
            self.defaults.insert(parameter.name().to_string(), default);
        }
        self.parameters.push(parameter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

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

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn defaults(&self) -> &Fields {
        &self.defaults
    }

    pub fn find_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    /// Fill in defaults for any declared value missing from `values`,
    /// normalizing the rest
    pub fn resolve_values(&self, values: &Fields) -> Fields {
        let mut out = Fields::new();
        for p in &self.parameters {
            let raw = values.get(p.name()).or_else(|| self.defaults.get(p.name()));
            if let Some(raw) = raw {
                out.insert(p.name().to_string(), p.normalize(raw));
            }
        }
        for (k, v) in values {
            if !out.contains_key(k) {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }

    /// Merge the descriptive fields and value shape of `other`
    ///
    /// Returns true if anything changed.
    pub fn update(&mut self, other: &Transition) -> bool {
        let mut changed = false;
        if self.label != other.label {
            self.label = other.label.clone();
            changed = true;
        }
        if self.description != other.description {
            self.description = other.description.clone();
            changed = true;
        }
        if self.parameters != other.parameters {
            self.parameters = other.parameters.clone();
            changed = true;
        }
        if self.defaults != other.defaults {
            self.defaults = other.defaults.clone();
            changed = true;
        }
        changed
    }
}
