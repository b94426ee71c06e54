//! Device Registry
//!
//! Owns the live device set of a deployment. Devices are added from
//! persisted records or bridge catalogs, merged when their definition is
//! republished, and removed explicitly. Every device event delivered by the
//! change notifier is also fanned out on a broadcast channel.

use casa_core::{BridgeEvent, DeviceEvent, DeviceId, Fields, Value};
use casa_notifier::{ChangeNotifier, ListenerId, ListenerResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::storage::{Storable, Storage};
use crate::{BridgeRegistry, Device, DeviceDefinition, DeviceError, DeviceResult};

/// Capacity of the registry event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Persisted registry contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistryData {
    pub devices: Vec<DeviceDefinition>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = "casa.devices";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

/// Outcome of reconciling a bridge catalog with the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub updated: usize,
    pub disabled: usize,
    pub removed: usize,
}

/// Registry of live devices
pub struct DeviceRegistry {
    storage: Arc<Storage>,
    notifier: Arc<ChangeNotifier>,
    bridges: Arc<BridgeRegistry>,
    devices: RwLock<IndexMap<DeviceId, Arc<Device>>>,
    events: broadcast::Sender<DeviceEvent>,
    forwarder: ListenerId,
}

impl DeviceRegistry {
    pub fn new(
        storage: Arc<Storage>,
        notifier: Arc<ChangeNotifier>,
        bridges: Arc<BridgeRegistry>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let tx = events.clone();
        let forwarder = notifier.add_listener(move |event: &DeviceEvent| -> ListenerResult {
            // No subscribers is not an error
            let _ = tx.send(event.clone());
            Ok(())
        });

        Self {
            storage,
            notifier,
            bridges,
            devices: RwLock::new(IndexMap::new()),
            events,
            forwarder,
        }
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    pub fn bridges(&self) -> &Arc<BridgeRegistry> {
        &self.bridges
    }

    /// Subscribe to device events
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Build a device from a record without registering it
    ///
    /// The record is handed to its owning bridge when that bridge is known.
    /// Returns `None` for records that do not describe a valid device.
    pub fn create_device(&self, fields: &Fields) -> Option<Arc<Device>> {
        let bridge = fields
            .get("BRIDGE")
            .and_then(Value::as_str)
            .and_then(|name| self.bridges.get(name));

        let definition = match &bridge {
            Some(bridge) => bridge.create_device(fields)?,
            None => match DeviceDefinition::from_fields(fields) {
                Ok(definition) => definition,
                Err(e) => {
                    debug!(error = %e, "Rejected device record");
                    return None;
                }
            },
        };

        match self.build_device(definition) {
            Ok(device) if device.is_valid() => Some(Arc::new(device)),
            Ok(device) => {
                debug!(device_id = %device.id(), "Rejected invalid device");
                None
            }
            Err(e) => {
                debug!(error = %e, "Rejected device record");
                None
            }
        }
    }

    /// Build a device, resolving its owning bridge
    pub fn build_device(&self, definition: DeviceDefinition) -> DeviceResult<Device> {
        let bridge = definition
            .bridge
            .as_deref()
            .and_then(|name| self.bridges.get(name));
        Device::new(definition, bridge, Arc::clone(&self.notifier))
    }

    /// Add a device, or merge it into the device already holding its id
    #[instrument(skip(self, definition), fields(device_id = %definition.id))]
    pub fn add_device(&self, definition: DeviceDefinition) -> DeviceResult<Arc<Device>> {
        definition.validate()?;

        if let Some(existing) = self.get(&definition.id) {
            existing.update(&definition);
            return Ok(existing);
        }

        let device = Arc::new(self.build_device(definition.clone())?);
        match self.insert_new(device) {
            Ok(device) => {
                info!(name = %device.name(), "Registered device");
                self.notifier.notify(&DeviceEvent::Added {
                    device_id: device.id().clone(),
                });
                Ok(device)
            }
            // Lost a race with a concurrent add of the same id
            Err(existing) => {
                existing.update(&definition);
                Ok(existing)
            }
        }
    }

    /// Insert a device unless its id is taken, returning the holder on conflict
    fn insert_new(&self, device: Arc<Device>) -> Result<Arc<Device>, Arc<Device>> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = devices.get(device.id()) {
            return Err(Arc::clone(existing));
        }
        devices.insert(device.id().clone(), Arc::clone(&device));
        Ok(device)
    }

    /// Remove a device and drop its stored values
    pub fn remove_device(&self, id: &DeviceId) -> Option<Arc<Device>> {
        let removed = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(id)?;

        removed.clear_values();
        info!(device_id = %id, "Removed device");
        self.notifier.notify(&DeviceEvent::Removed {
            device_id: id.clone(),
        });
        Some(removed)
    }

    pub fn get(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.read().get(id).cloned()
    }

    /// Find a device by id, then by name
    pub fn find_device(&self, key: &str) -> Option<Arc<Device>> {
        let devices = self.read();
        devices
            .get(&DeviceId::new(key))
            .or_else(|| devices.values().find(|d| d.name() == key))
            .cloned()
    }

    /// All devices, in registration order
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.read().values().cloned().collect()
    }

    pub fn devices_for_bridge(&self, bridge: &str) -> Vec<Arc<Device>> {
        self.read()
            .values()
            .filter(|d| d.bridge_name() == Some(bridge))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Reconcile a bridge catalog with the registry
    ///
    /// Each found definition is merged into the device with the same id or
    /// added. Devices of the bridge missing from the catalog are removed
    /// when `remove_missing` is set, otherwise disabled.
    #[instrument(skip(self, found))]
    pub fn update_devices(
        &self,
        bridge: &str,
        found: Vec<DeviceDefinition>,
        remove_missing: bool,
    ) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let mut seen = Vec::with_capacity(found.len());

        for mut definition in found {
            if definition.bridge.is_none() {
                definition.bridge = Some(bridge.to_string());
            }
            seen.push(definition.id.clone());

            match self.get(&definition.id) {
                Some(existing) => {
                    if existing.update(&definition) {
                        summary.updated += 1;
                    }
                }
                None => match self.add_device(definition) {
                    Ok(_) => summary.added += 1,
                    Err(e) => warn!(error = %e, "Skipping device from catalog"),
                },
            }
        }

        for device in self.devices_for_bridge(bridge) {
            if seen.contains(device.id()) {
                continue;
            }
            if remove_missing {
                if self.remove_device(device.id()).is_some() {
                    summary.removed += 1;
                }
            } else if device.set_enabled(false) {
                summary.disabled += 1;
            }
        }

        info!(
            added = summary.added,
            updated = summary.updated,
            disabled = summary.disabled,
            removed = summary.removed,
            "Reconciled bridge devices"
        );
        summary
    }

    /// Fetch a bridge's catalog and reconcile it
    pub async fn discover(&self, bridge_name: &str) -> DeviceResult<ReconcileSummary> {
        let bridge = self
            .bridges
            .get(bridge_name)
            .ok_or_else(|| DeviceError::NotFound(format!("bridge {bridge_name}")))?;
        let found = bridge.find_devices().await?;
        Ok(self.update_devices(bridge_name, found, false))
    }

    /// Apply an inbound bridge message
    ///
    /// Malformed messages and unknown devices or parameters are logged and
    /// dropped. Returns true if a value changed.
    pub fn handle_event(&self, raw: &Value) -> bool {
        let event = match BridgeEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping bridge event");
                return false;
            }
        };

        match event {
            BridgeEvent::Parameter {
                device,
                parameter,
                value,
            } => {
                let Some(target) = self.find_device(&device) else {
                    warn!(device = %device, "Bridge event for unknown device");
                    return false;
                };
                let Some(found) = target.find_parameter(&parameter) else {
                    warn!(device = %device, parameter = %parameter, "Bridge event for unknown parameter");
                    return false;
                };
                target.set_parameter_value(&found, &value)
            }
        }
    }

    /// Apply an inbound bridge message on the runtime
    pub fn spawn_event(self: &Arc<Self>, raw: Value) -> JoinHandle<bool> {
        let registry = Arc::clone(self);
        tokio::spawn(async move { registry.handle_event(&raw) })
    }

    /// Load persisted devices
    ///
    /// Records that fail validation are skipped. Returns the number of
    /// devices loaded.
    pub async fn load(&self) -> DeviceResult<usize> {
        let Some(data) = self.storage.load::<DeviceRegistryData>().await? else {
            return Ok(0);
        };

        let total = data.devices.len();
        let mut loaded = 0;
        for definition in data.devices {
            match self.add_device(definition) {
                Ok(_) => loaded += 1,
                Err(e) => warn!(error = %e, "Skipping stored device"),
            }
        }
        info!("Loaded {} of {} devices from storage", loaded, total);
        Ok(loaded)
    }

    /// Persist all devices
    pub async fn save(&self) -> DeviceResult<()> {
        let data = DeviceRegistryData {
            devices: self.devices().iter().map(|d| d.to_definition()).collect(),
        };
        self.storage.save(&data).await?;
        debug!("Saved {} devices to storage", data.devices.len());
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<DeviceId, Arc<Device>>> {
        self.devices.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.notifier.remove_listener(self.forwarder);
    }
}

/// Thread-safe wrapper for DeviceRegistry
pub type SharedDeviceRegistry = Arc<DeviceRegistry>;
