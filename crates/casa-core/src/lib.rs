//! Core types for casa
//!
//! This crate provides the fundamental types shared by every other casa
//! crate: parameter and transition definitions, device and parameter
//! identifiers, and the events that flow between devices, listeners and
//! bridges.

mod event;
mod ids;
mod parameter;
mod transition;

pub use event::{BridgeEvent, BridgeEventError, DeviceEvent};
pub use ids::{DeviceId, ParameterId};
pub use parameter::{Parameter, ParameterType, ValueError};
pub use transition::Transition;

/// Canonical parameter value representation
pub type Value = serde_json::Value;

/// Key/value record as exchanged with bridges and persisted to storage
pub type Fields = serde_json::Map<String, serde_json::Value>;
