//! Controller context
//!
//! Owns the value store, notifier, bridges, device registry and polling
//! scheduler of one deployment, and wires registry events to the
//! scheduler so bridge backed devices are refreshed while registered.

use casa_config::ControllerConfig;
use casa_core::DeviceEvent;
use casa_devices::{
    Bridge, BridgeRegistry, Device, DeviceRefresher, DeviceRegistry, DeviceResult, Storage,
};
use casa_notifier::ChangeNotifier;
use casa_scheduler::PollingScheduler;
use casa_value_store::ValueStore;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// The running controller
pub struct Controller {
    pub config: ControllerConfig,
    pub store: Arc<ValueStore>,
    pub notifier: Arc<ChangeNotifier>,
    pub bridges: Arc<BridgeRegistry>,
    pub registry: Arc<DeviceRegistry>,
    pub scheduler: Arc<PollingScheduler<Device>>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Controller {
    pub fn new(config: ControllerConfig, config_dir: impl AsRef<Path>) -> Self {
        let store = Arc::new(ValueStore::new());
        let notifier = Arc::new(ChangeNotifier::new(store.clone()));
        let bridges = Arc::new(BridgeRegistry::new());
        let storage = Arc::new(Storage::new(config.storage_path(config_dir)));
        let registry = Arc::new(DeviceRegistry::new(
            storage,
            notifier.clone(),
            bridges.clone(),
        ));
        let scheduler = Arc::new(PollingScheduler::new(
            "devices",
            config.poll_interval(),
            Arc::new(DeviceRefresher::new()),
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            store,
            notifier,
            bridges,
            registry,
            scheduler,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Make a bridge available, ignored when disabled in the configuration
    pub fn register_bridge(&self, bridge: Arc<dyn Bridge>) {
        let configured = self.config.bridges.iter().find(|b| b.name == bridge.name());
        if configured.is_some_and(|b| !b.enabled) {
            info!(bridge = bridge.name(), "Bridge disabled in configuration");
            return;
        }
        self.bridges.register(bridge);
    }

    /// Load devices, discover bridge catalogs and start refreshing
    pub async fn start(&self) -> DeviceResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Controller already running");
            return Ok(());
        }
        info!(name = %self.config.name, "Starting controller");

        self.spawn_wiring();

        let loaded = self.registry.load().await?;
        debug!(loaded, "Loaded stored devices");

        for name in self.config.enabled_bridges() {
            if self.bridges.get(name).is_none() {
                warn!(bridge = name, "Configured bridge is not available");
                continue;
            }
            match self.registry.discover(name).await {
                Ok(summary) => debug!(bridge = name, ?summary, "Discovered devices"),
                Err(e) => warn!(bridge = name, error = %e, "Device discovery failed"),
            }
        }

        self.scheduler.start();
        info!(devices = self.registry.len(), "Controller started");
        Ok(())
    }

    /// Stop refreshing and persist the registry
    pub async fn shutdown(&self) -> DeviceResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Stopping controller");
        let _ = self.shutdown_tx.send(());
        self.scheduler.stop();
        self.registry.save().await
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Keep the scheduler in step with the registry
    fn spawn_wiring(&self) {
        let mut event_rx = self.registry.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let registry = self.registry.clone();
        let scheduler = self.scheduler.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = event_rx.recv() => {
                        match event {
                            Ok(DeviceEvent::Added { device_id }) => {
                                let Some(device) = registry.get(&device_id) else {
                                    continue;
                                };
                                if device.bridge().is_some() {
                                    scheduler.register(device).await;
                                }
                            }
                            Ok(DeviceEvent::Removed { device_id }) => {
                                scheduler.unregister(device_id.as_str());
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("Controller lagged by {} device events", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("Device wiring stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use casa_config::BridgeConfig;
    use casa_core::{Fields, Parameter, Transition};
    use casa_devices::DeviceDefinition;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Weather;

    #[async_trait]
    impl Bridge for Weather {
        fn name(&self) -> &str {
            "weather"
        }

        async fn find_devices(&self) -> DeviceResult<Vec<DeviceDefinition>> {
            Ok(vec![DeviceDefinition::new("Outside")
                .with_id("outside")
                .with_parameter(Parameter::real("Temperature", None, None).sensor())])
        }

        async fn apply_transition(
            &self,
            _device: &Device,
            _transition: &Transition,
            _values: &Fields,
        ) -> DeviceResult<()> {
            Ok(())
        }

        async fn update_parameter_values(&self, _device: &Device) -> DeviceResult<Fields> {
            let mut values = Fields::new();
            values.insert("Temperature".into(), json!(4.5));
            Ok(values)
        }
    }

    fn config() -> ControllerConfig {
        ControllerConfig {
            bridges: vec![BridgeConfig {
                name: "weather".into(),
                enabled: true,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_discovers_and_refreshes() {
        let dir = TempDir::new().unwrap();
        let controller = Controller::new(config(), dir.path());
        controller.register_bridge(Arc::new(Weather));

        controller.start().await.unwrap();
        assert!(controller.is_running());

        let device = controller.registry.find_device("Outside").unwrap();
        for _ in 0..100 {
            if device.parameter_value("Temperature").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(device.parameter_value("Temperature"), Some(json!(4.5)));
        assert!(controller.scheduler.contains("outside"));

        controller.shutdown().await.unwrap();
        assert!(!controller.is_running());
        assert!(dir.path().join(".casa").join("casa.devices").exists());
    }

    #[tokio::test]
    async fn test_disabled_bridge_is_not_registered() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.bridges[0].enabled = false;
        let controller = Controller::new(config, dir.path());
        controller.register_bridge(Arc::new(Weather));

        assert!(controller.bridges.is_empty());
        controller.start().await.unwrap();
        assert!(controller.registry.is_empty());
        controller.shutdown().await.unwrap();
    }
}
