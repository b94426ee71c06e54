//! Devices, bridges and the device registry for casa
//!
//! - [`Device`]: a live device with parameter values in the shared store
//! - [`DeviceRegistry`]: the device set of a deployment, with persistence
//! - [`Bridge`]: adapter to an external service, selected by name
//! - [`DeviceRefresher`]: bulk refresh of bridge backed devices

mod bridge;
mod definition;
mod device;
mod error;
mod refresher;
mod registry;
pub mod storage;

pub use bridge::{Bridge, BridgeRegistry, SharedBridgeRegistry};
pub use definition::DeviceDefinition;
pub use device::{Device, DeviceBehavior, NoBehavior, SharedDevice};
pub use error::{DeviceError, DeviceResult};
pub use refresher::DeviceRefresher;
pub use registry::{DeviceRegistry, DeviceRegistryData, ReconcileSummary, SharedDeviceRegistry};
pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};
