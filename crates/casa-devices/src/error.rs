//! Error types for devices and bridges

use casa_core::DeviceId;
use thiserror::Error;

use crate::storage::StorageError;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors raised by devices, bridges and the registry
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A device definition failed validation
    #[error("invalid device definition: {0}")]
    Invalid(String),

    /// A transition could not be applied
    #[error("cannot apply {transition} to device {device}: {reason}")]
    Action {
        device: DeviceId,
        transition: String,
        reason: String,
    },

    /// The owning bridge reported a failure
    #[error("bridge {bridge} failed: {message}")]
    Bridge { bridge: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DeviceError {
    pub fn bridge(bridge: impl Into<String>, message: impl ToString) -> Self {
        DeviceError::Bridge {
            bridge: bridge.into(),
            message: message.to_string(),
        }
    }
}
