//! Bulk refresh of bridge backed devices

use async_trait::async_trait;
use casa_core::Fields;
use casa_scheduler::{BulkRefresher, Pollable};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::Device;

/// Fetches values for a batch of devices from their owning bridges
///
/// Devices are queried concurrently. A failing device is logged and left
/// out of the result.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceRefresher;

impl DeviceRefresher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BulkRefresher<Device> for DeviceRefresher {
    async fn refresh(&self, batch: &[Arc<Device>]) -> HashMap<String, Fields> {
        let fetched = join_all(batch.iter().map(|device| async move {
            (device.poll_key(), device.fetch_values().await)
        }))
        .await;

        let mut results = HashMap::with_capacity(fetched.len());
        for (key, outcome) in fetched {
            match outcome {
                Ok(Some(values)) => {
                    results.insert(key, values);
                }
                Ok(None) => {}
                Err(e) => warn!(device_id = %key, error = %e, "Device refresh failed"),
            }
        }
        results
    }
}
