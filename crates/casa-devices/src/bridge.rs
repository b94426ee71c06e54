//! Bridge capability interface
//!
//! A bridge adapts an external service (a weather feed, a cloud device
//! API, a calendar) to the device model. Bridges are registered by name in
//! a [`BridgeRegistry`]; devices record the name of their owning bridge and
//! are resolved against the registry when built.

use async_trait::async_trait;
use casa_core::{Fields, Transition};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{Device, DeviceDefinition, DeviceResult};

/// An adapter between the device model and an external service
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Service name, as recorded in device definitions
    fn name(&self) -> &str;

    /// Build a device definition from a bridge supplied record
    ///
    /// Returns `None` when the record does not describe a valid device.
    fn create_device(&self, fields: &Fields) -> Option<DeviceDefinition> {
        match DeviceDefinition::from_fields(fields) {
            Ok(mut definition) => {
                definition.bridge = Some(self.name().to_string());
                Some(definition)
            }
            Err(e) => {
                debug!(bridge = self.name(), error = %e, "Rejected device record");
                None
            }
        }
    }

    /// Current catalog of devices offered by the service
    async fn find_devices(&self) -> DeviceResult<Vec<DeviceDefinition>>;

    /// Execute a transition on a device
    async fn apply_transition(
        &self,
        device: &Device,
        transition: &Transition,
        values: &Fields,
    ) -> DeviceResult<()>;

    /// Fetch current parameter values for a device, keyed by parameter name
    async fn update_parameter_values(&self, device: &Device) -> DeviceResult<Fields>;
}

/// Bridges available to a deployment, keyed by name
#[derive(Default)]
pub struct BridgeRegistry {
    bridges: DashMap<String, Arc<dyn Bridge>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bridge, replacing any bridge of the same name
    pub fn register(&self, bridge: Arc<dyn Bridge>) {
        let name = bridge.name().to_string();
        info!(bridge = %name, "Registered bridge");
        self.bridges.insert(name, bridge);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Bridge>> {
        self.bridges.get(name).map(|b| Arc::clone(b.value()))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Bridge>> {
        self.bridges.remove(name).map(|(_, b)| b)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bridges.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}

/// Thread-safe wrapper for BridgeRegistry
pub type SharedBridgeRegistry = Arc<BridgeRegistry>;
