//! Live devices
//!
//! A [`Device`] owns its parameter and transition definitions and keeps
//! parameter values in the shared value store. Definitions are swapped as
//! whole `Arc<Vec<_>>` snapshots, so a reader always sees either the list
//! before a merge or the list after it, never a partially rebuilt one.

use casa_core::{DeviceEvent, DeviceId, Fields, Parameter, Transition, Value};
use casa_notifier::ChangeNotifier;
use casa_scheduler::Pollable;
use casa_value_store::ValueStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, instrument, trace, warn};

use crate::{Bridge, DeviceDefinition, DeviceError, DeviceResult};

/// Device specific hooks
///
/// Hooks run on the caller's thread without any device lock held. They must
/// not call back into the method that triggered them.
pub trait DeviceBehavior: Send + Sync {
    /// Bring stored values up to date before a read
    fn refresh_state(&self, _device: &Device) {}

    /// Called when the device becomes enabled
    fn on_start(&self, _device: &Device) {}

    /// Called when the device becomes disabled
    fn on_stop(&self, _device: &Device) {}

    /// Additional validity checks beyond a non-empty id and name
    fn is_valid(&self, _device: &Device) -> bool {
        true
    }
}

/// Behavior with no hooks
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBehavior;

impl DeviceBehavior for NoBehavior {}

#[derive(Debug, Clone, Default)]
struct DeviceInfo {
    name: String,
    label: String,
    description: String,
}

/// A controllable or observable endpoint
pub struct Device {
    id: DeviceId,
    info: RwLock<DeviceInfo>,
    parameters: RwLock<Arc<Vec<Parameter>>>,
    transitions: RwLock<Arc<Vec<Transition>>>,
    /// Serializes writers of the definition snapshots
    merge_lock: Mutex<()>,
    enabled: AtomicBool,
    in_use: AtomicBool,
    bridge_name: Option<String>,
    bridge: Option<Arc<dyn Bridge>>,
    behavior: Arc<dyn DeviceBehavior>,
    notifier: Arc<ChangeNotifier>,
    is_calendar: bool,
}

impl Device {
    /// Build a device from a definition
    ///
    /// `bridge` is the resolved owning bridge. A definition naming a bridge
    /// that could not be resolved yields a disabled device.
    pub fn new(
        definition: DeviceDefinition,
        bridge: Option<Arc<dyn Bridge>>,
        notifier: Arc<ChangeNotifier>,
    ) -> DeviceResult<Self> {
        definition.validate()?;

        let mut enabled = definition.enabled;
        if let Some(name) = &definition.bridge {
            if bridge.is_none() {
                warn!(device_id = %definition.id, bridge = %name, "Bridge not found, disabling device");
                enabled = false;
            }
        }

        let parameters = definition
            .parameters
            .into_iter()
            .map(Parameter::with_fresh_id)
            .collect();

        Ok(Self {
            id: definition.id,
            info: RwLock::new(DeviceInfo {
                name: definition.name,
                label: definition.label,
                description: definition.description,
            }),
            parameters: RwLock::new(Arc::new(parameters)),
            transitions: RwLock::new(Arc::new(definition.transitions)),
            merge_lock: Mutex::new(()),
            enabled: AtomicBool::new(enabled),
            in_use: AtomicBool::new(true),
            bridge_name: definition.bridge,
            bridge,
            behavior: Arc::new(NoBehavior),
            notifier,
            is_calendar: definition.is_calendar,
        })
    }

    /// Attach device specific hooks
    pub fn with_behavior(mut self, behavior: Arc<dyn DeviceBehavior>) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn name(&self) -> String {
        self.info().name.clone()
    }

    /// Display label, falling back to the name
    pub fn label(&self) -> String {
        let info = self.info();
        if info.label.is_empty() {
            info.name.clone()
        } else {
            info.label.clone()
        }
    }

    pub fn description(&self) -> String {
        self.info().description.clone()
    }

    pub fn bridge(&self) -> Option<&Arc<dyn Bridge>> {
        self.bridge.as_ref()
    }

    pub fn bridge_name(&self) -> Option<&str> {
        self.bridge_name.as_deref()
    }

    pub fn is_calendar(&self) -> bool {
        self.is_calendar
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// A device is valid with a non-empty id and name
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.info().name.trim().is_empty() && self.behavior.is_valid(self)
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Mark whether a consumer currently depends on this device's values
    pub fn set_in_use(&self, in_use: bool) {
        self.in_use.store(in_use, Ordering::SeqCst);
    }

    /// Snapshot of the parameter definitions, in display order
    pub fn parameters(&self) -> Arc<Vec<Parameter>> {
        Arc::clone(&self.parameters.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Snapshot of the transition definitions, in display order
    pub fn transitions(&self) -> Arc<Vec<Transition>> {
        Arc::clone(&self.transitions.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Find a parameter by name, then by label
    pub fn find_parameter(&self, name: &str) -> Option<Parameter> {
        let parameters = self.parameters();
        parameters
            .iter()
            .find(|p| p.name() == name)
            .or_else(|| parameters.iter().find(|p| p.label() == name))
            .cloned()
    }

    /// Find a transition by name, then by label
    pub fn find_transition(&self, name: &str) -> Option<Transition> {
        let transitions = self.transitions();
        transitions
            .iter()
            .find(|t| t.name() == name)
            .or_else(|| transitions.iter().find(|t| t.label() == name))
            .cloned()
    }

    /// Add a parameter definition
    ///
    /// A parameter already present (same identity) is left alone, as is an
    /// existing parameter of the same name and type, whose value is kept.
    /// A same-name parameter of another type is replaced in place and its
    /// value dropped. Returns the parameter the device now holds.
    pub fn add_parameter(&self, parameter: Parameter) -> Parameter {
        let _merge = self.lock_merge();
        let current = self.parameters();
        if let Some(existing) = current.iter().find(|p| p.id() == parameter.id()) {
            return existing.clone();
        }

        let mut next = current.as_ref().clone();
        match next.iter().position(|p| p.name() == parameter.name()) {
            Some(i) if next[i].parameter_type() == parameter.parameter_type() => {
                return next[i].clone();
            }
            Some(i) => {
                self.store().remove(&next[i].id());
                next[i] = parameter.clone();
            }
            None => next.push(parameter.clone()),
        }
        *self.parameters.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        parameter
    }

    /// Add a transition, replacing one of the same name in place
    pub fn add_transition(&self, transition: Transition) {
        let _merge = self.lock_merge();
        let mut next = self.transitions().as_ref().clone();
        match next.iter().position(|t| t.name() == transition.name()) {
            Some(i) => next[i] = transition,
            None => next.push(transition),
        }
        *self.transitions.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    /// Current value of a parameter
    ///
    /// Returns `None` while the device is disabled. A foreign parameter
    /// resolves to the device's parameter of the same name and type, and is
    /// adopted when there is none.
    pub fn get_parameter_value(&self, parameter: &Parameter) -> Option<Value> {
        if !self.is_enabled() {
            return None;
        }
        let own = self.resolve_parameter(parameter);
        self.behavior.refresh_state(self);
        self.store().get_value(&own)
    }

    /// Current value of a parameter looked up by name or label
    pub fn parameter_value(&self, name: &str) -> Option<Value> {
        let parameter = self.find_parameter(name)?;
        self.get_parameter_value(&parameter)
    }

    /// Set a parameter value
    ///
    /// Does nothing while the device is disabled. The value is normalized
    /// first; when it equals the current value nothing is stored and no
    /// notification fires. Otherwise exactly one change notification is
    /// delivered, inside an update boundary, before this returns. Returns
    /// true if the value changed.
    #[instrument(skip(self, parameter, value), fields(device_id = %self.id, parameter = %parameter.name()))]
    pub fn set_parameter_value(&self, parameter: &Parameter, value: &Value) -> bool {
        if !self.is_enabled() {
            debug!("Device disabled, ignoring value");
            return false;
        }
        let own = self.resolve_parameter(parameter);

        let store = self.store();
        let Some(stored) = store.replace_if_changed(&own, value) else {
            trace!("Value unchanged");
            return false;
        };

        let _boundary = store.begin_update();
        self.notifier.notify_changed(&DeviceEvent::ParameterChanged {
            device_id: self.id.clone(),
            parameter: own.name().to_string(),
            parameter_id: own.id(),
            value: Some(stored),
        });
        true
    }

    /// Apply values keyed by parameter name or label
    ///
    /// Unknown names are logged and skipped. Returns the number of values
    /// that changed.
    pub fn apply_values(&self, values: &Fields) -> usize {
        let mut changed = 0;
        for (name, value) in values {
            match self.find_parameter(name) {
                Some(parameter) => {
                    if self.set_parameter_value(&parameter, value) {
                        changed += 1;
                    }
                }
                None => debug!(device_id = %self.id, parameter = %name, "Unknown parameter in update"),
            }
        }
        changed
    }

    /// Enable or disable the device
    ///
    /// Idempotent. Enabling runs the start hook and disabling the stop
    /// hook; either way an enabled-changed event is delivered. Returns true
    /// if the state changed.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        if self
            .enabled
            .compare_exchange(!enabled, enabled, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        info!(device_id = %self.id, enabled, "Device enabled state changed");
        if enabled {
            self.behavior.on_start(self);
        } else {
            self.behavior.on_stop(self);
        }
        self.notifier.notify(&DeviceEvent::EnabledChanged {
            device_id: self.id.clone(),
            enabled,
        });
        true
    }

    /// Merge a republished definition into this device
    ///
    /// Parameters and transitions are matched by name. A matched parameter
    /// of the same type keeps its identity, and with it its stored value; a
    /// parameter whose type changed is replaced and its old value dropped.
    /// A differing enabled flag is applied and counts as a change.
    /// Returns true if anything changed, in which case one device-updated
    /// event is delivered after all fields were applied.
    #[instrument(skip(self, definition), fields(device_id = %self.id))]
    pub fn update(&self, definition: &DeviceDefinition) -> bool {
        let merge = self.lock_merge();
        let mut changed = false;

        {
            let mut info = self.info.write().unwrap_or_else(PoisonError::into_inner);
            if info.name != definition.name {
                info.name = definition.name.clone();
                changed = true;
            }
            if info.label != definition.label {
                info.label = definition.label.clone();
                changed = true;
            }
            if info.description != definition.description {
                info.description = definition.description.clone();
                changed = true;
            }
        }

        let current = self.parameters();
        let mut next = Vec::with_capacity(definition.parameters.len());
        let mut dropped = Vec::new();
        for incoming in &definition.parameters {
            match current.iter().find(|p| p.name() == incoming.name()) {
                None => {
                    changed = true;
                    next.push(incoming.clone().with_fresh_id());
                }
                Some(existing) if existing.parameter_type() != incoming.parameter_type() => {
                    debug!(parameter = %incoming.name(), "Parameter type changed");
                    changed = true;
                    dropped.push(existing.id());
                    next.push(incoming.clone().with_fresh_id());
                }
                Some(existing) => {
                    let mut merged = existing.clone();
                    if merged.update(incoming) {
                        changed = true;
                    }
                    next.push(merged);
                }
            }
        }
        for old in current.iter() {
            if !definition.parameters.iter().any(|p| p.name() == old.name()) {
                changed = true;
                dropped.push(old.id());
            }
        }
        *self.parameters.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);

        let current = self.transitions();
        let mut next = Vec::with_capacity(definition.transitions.len());
        for incoming in &definition.transitions {
            match current.iter().find(|t| t.name() == incoming.name()) {
                None => {
                    changed = true;
                    next.push(incoming.clone());
                }
                Some(existing) => {
                    let mut merged = existing.clone();
                    if merged.update(incoming) {
                        changed = true;
                    }
                    next.push(merged);
                }
            }
        }
        if current
            .iter()
            .any(|old| !definition.transitions.iter().any(|t| t.name() == old.name()))
        {
            changed = true;
        }
        *self.transitions.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        drop(merge);

        let store = self.store();
        for id in dropped {
            store.remove(&id);
        }

        if self.is_enabled() != definition.enabled {
            self.set_enabled(definition.enabled);
            changed = true;
        }

        if changed {
            debug!("Device definition changed");
            self.notifier.notify(&DeviceEvent::Updated {
                device_id: self.id.clone(),
            });
        }
        changed
    }

    /// Execute a transition through the owning bridge
    ///
    /// Fails with an action error when the transition is unknown, the
    /// device is disabled, or the device has no bridge.
    #[instrument(skip(self, values), fields(device_id = %self.id))]
    pub async fn apply_transition(&self, transition: &str, values: &Fields) -> DeviceResult<()> {
        let action_error = |reason: &str| DeviceError::Action {
            device: self.id.clone(),
            transition: transition.to_string(),
            reason: reason.to_string(),
        };

        let found = self
            .find_transition(transition)
            .ok_or_else(|| action_error("unknown transition"))?;
        if !self.is_enabled() {
            return Err(action_error("device is disabled"));
        }
        let bridge = self
            .bridge
            .as_ref()
            .ok_or_else(|| action_error("device has no bridge"))?;

        let values = found.resolve_values(values);
        debug!(bridge = bridge.name(), "Applying transition");
        bridge.apply_transition(self, &found, &values).await
    }

    /// Fetch current values from the owning bridge without applying them
    ///
    /// `None` for a device without a bridge.
    pub async fn fetch_values(&self) -> DeviceResult<Option<Fields>> {
        match &self.bridge {
            Some(bridge) => bridge.update_parameter_values(self).await.map(Some),
            None => Ok(None),
        }
    }

    /// Refresh parameter values from the owning bridge
    ///
    /// Returns the number of values that changed.
    pub async fn update_parameter_values(&self) -> DeviceResult<usize> {
        if !self.is_enabled() {
            return Ok(0);
        }
        match self.fetch_values().await? {
            Some(values) => Ok(self.apply_values(&values)),
            None => Ok(0),
        }
    }

    /// Persisted form of the current state
    pub fn to_definition(&self) -> DeviceDefinition {
        let info = self.info().clone();
        DeviceDefinition {
            id: self.id.clone(),
            name: info.name,
            label: info.label,
            description: info.description,
            bridge: self.bridge_name.clone(),
            enabled: self.is_enabled(),
            parameters: self.parameters().as_ref().clone(),
            transitions: self.transitions().as_ref().clone(),
            is_calendar: self.is_calendar,
        }
    }

    /// Drop every stored value of this device
    pub(crate) fn clear_values(&self) {
        let store = self.store();
        for p in self.parameters().iter() {
            store.remove(&p.id());
        }
    }

    fn store(&self) -> &Arc<ValueStore> {
        self.notifier.store()
    }

    fn info(&self) -> std::sync::RwLockReadGuard<'_, DeviceInfo> {
        self.info.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_merge(&self) -> std::sync::MutexGuard<'_, ()> {
        self.merge_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The device's own parameter for `parameter`, adopting it if unknown
    fn resolve_parameter(&self, parameter: &Parameter) -> Parameter {
        if let Some(own) = self.parameters().iter().find(|p| p.id() == parameter.id()) {
            return own.clone();
        }
        let own = self.add_parameter(parameter.clone());
        if own.id() == parameter.id() {
            warn!(
                device_id = %self.id,
                parameter = %parameter.name(),
                "Parameter does not belong to device, adding it"
            );
        }
        own
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.info().name)
            .field("bridge", &self.bridge_name)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Pollable for Device {
    fn poll_key(&self) -> String {
        self.id.to_string()
    }

    fn is_valid(&self) -> bool {
        Device::is_valid(self)
    }

    fn is_enabled(&self) -> bool {
        Device::is_enabled(self)
    }

    fn is_in_use(&self) -> bool {
        Device::is_in_use(self)
    }

    fn apply_refresh(&self, values: &Fields) {
        let changed = self.apply_values(values);
        trace!(device_id = %self.id, changed, "Applied refresh");
    }
}

/// Thread-safe wrapper for Device
pub type SharedDevice = Arc<Device>;

#[cfg(test)]
mod tests {
    use super::*;
    use casa_core::DeviceEvent;
    use casa_notifier::ListenerResult;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn notifier() -> Arc<ChangeNotifier> {
        Arc::new(ChangeNotifier::new(Arc::new(ValueStore::new())))
    }

    fn lamp_definition() -> DeviceDefinition {
        DeviceDefinition::new("Lamp")
            .with_id("lamp")
            .with_parameter(Parameter::boolean("On"))
            .with_parameter(Parameter::integer("Level", 0, 100).with_label("Brightness"))
            .with_transition(Transition::new("Toggle"))
    }

    fn record(notifier: &ChangeNotifier) -> Arc<StdMutex<Vec<DeviceEvent>>> {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        notifier.add_listener(move |e: &DeviceEvent| -> ListenerResult {
            sink.lock().unwrap().push(e.clone());
            Ok(())
        });
        events
    }

    #[test]
    fn test_set_then_get() {
        let device = Device::new(lamp_definition(), None, notifier()).unwrap();
        let level = device.find_parameter("Level").unwrap();

        assert!(device.set_parameter_value(&level, &json!("250")));
        assert_eq!(device.get_parameter_value(&level), Some(json!(100)));
        assert_eq!(device.parameter_value("Brightness"), Some(json!(100)));
    }

    #[test]
    fn test_unchanged_value_does_not_notify() {
        let notifier = notifier();
        let events = record(&notifier);
        let device = Device::new(lamp_definition(), None, Arc::clone(&notifier)).unwrap();
        let on = device.find_parameter("On").unwrap();

        assert!(device.set_parameter_value(&on, &json!(true)));
        assert!(!device.set_parameter_value(&on, &json!("on")));
        assert!(!device.set_parameter_value(&device.find_parameter("Level").unwrap(), &Value::Null));
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_disabled_device_ignores_values() {
        let device = Device::new(lamp_definition(), None, notifier()).unwrap();
        let on = device.find_parameter("On").unwrap();
        device.set_parameter_value(&on, &json!(true));

        assert!(device.set_enabled(false));
        assert!(!device.set_enabled(false));
        assert_eq!(device.get_parameter_value(&on), None);
        assert!(!device.set_parameter_value(&on, &json!(false)));

        device.set_enabled(true);
        assert_eq!(device.get_parameter_value(&on), Some(json!(true)));
    }

    #[test]
    fn test_unknown_parameter_is_adopted() {
        let device = Device::new(lamp_definition(), None, notifier()).unwrap();
        let stray = Parameter::string("Note");

        assert!(device.set_parameter_value(&stray, &json!("hello")));
        assert_eq!(device.parameters().len(), 3);
        assert_eq!(device.get_parameter_value(&stray), Some(json!("hello")));
    }

    #[test]
    fn test_same_name_parameter_resolves_to_own() {
        let device = Device::new(lamp_definition(), None, notifier()).unwrap();
        let on = device.find_parameter("On").unwrap();
        assert!(device.set_parameter_value(&on, &json!(true)));

        let foreign = Parameter::boolean("On");
        assert_eq!(device.get_parameter_value(&foreign), Some(json!(true)));
        assert_eq!(device.parameters().len(), 2);
        assert_eq!(device.find_parameter("On").unwrap().id(), on.id());

        assert!(device.set_parameter_value(&foreign, &json!(false)));
        assert_eq!(device.get_parameter_value(&on), Some(json!(false)));
    }

    #[test]
    fn test_same_name_parameter_of_other_type_replaces() {
        let device = Device::new(lamp_definition(), None, notifier()).unwrap();
        let on = device.find_parameter("On").unwrap();
        device.set_parameter_value(&on, &json!(true));

        let text = Parameter::string("On");
        assert_eq!(device.get_parameter_value(&text), None);
        assert_eq!(device.parameters().len(), 2);
        assert_eq!(device.find_parameter("On").unwrap().id(), text.id());
    }

    #[test]
    fn test_concurrent_same_value_notifies_once() {
        let notifier = notifier();
        let events = record(&notifier);
        let device = Arc::new(Device::new(lamp_definition(), None, Arc::clone(&notifier)).unwrap());
        let on = device.find_parameter("On").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let device = Arc::clone(&device);
                let on = on.clone();
                std::thread::spawn(move || device.set_parameter_value(&on, &json!(true)))
            })
            .collect();
        let changed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|changed| *changed)
            .count();

        assert_eq!(changed, 1);
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_add_transition_replaces_in_place() {
        let device = Device::new(
            lamp_definition().with_transition(Transition::new("Dim")),
            None,
            notifier(),
        )
        .unwrap();
        device.add_transition(Transition::new("Toggle").with_label("Flip"));
        device.add_transition(Transition::new("Blink"));

        let names: Vec<_> = device.transitions().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["Toggle", "Dim", "Blink"]);
        assert_eq!(device.find_transition("Flip").unwrap().name(), "Toggle");
    }

    #[test]
    fn test_enabled_events() {
        let notifier = notifier();
        let events = record(&notifier);
        let device = Device::new(lamp_definition(), None, Arc::clone(&notifier)).unwrap();

        device.set_enabled(false);
        device.set_enabled(true);
        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                DeviceEvent::EnabledChanged {
                    device_id: "lamp".into(),
                    enabled: false
                },
                DeviceEvent::EnabledChanged {
                    device_id: "lamp".into(),
                    enabled: true
                },
            ]
        );
        assert!(!notifier.store().is_updating());
    }

    #[test]
    fn test_unresolved_bridge_disables_device() {
        let device = Device::new(lamp_definition().with_bridge("gone"), None, notifier()).unwrap();
        assert!(!device.is_enabled());
        assert_eq!(device.bridge_name(), Some("gone"));
    }

    #[tokio::test]
    async fn test_apply_transition_without_bridge_fails() {
        let device = Device::new(lamp_definition(), None, notifier()).unwrap();
        let err = device.apply_transition("Toggle", &Fields::new()).await;
        assert!(matches!(err, Err(DeviceError::Action { ref reason, .. }) if reason == "device has no bridge"));

        let err = device.apply_transition("Explode", &Fields::new()).await;
        assert!(matches!(err, Err(DeviceError::Action { .. })));
    }

    #[test]
    fn test_behavior_hooks() {
        #[derive(Default)]
        struct Counting {
            refreshed: std::sync::atomic::AtomicUsize,
            stopped: AtomicBool,
        }
        impl DeviceBehavior for Counting {
            fn refresh_state(&self, _device: &Device) {
                self.refreshed.fetch_add(1, Ordering::SeqCst);
            }
            fn on_stop(&self, _device: &Device) {
                self.stopped.store(true, Ordering::SeqCst);
            }
        }

        let behavior = Arc::new(Counting::default());
        let device = Device::new(lamp_definition(), None, notifier())
            .unwrap()
            .with_behavior(Arc::clone(&behavior) as Arc<dyn DeviceBehavior>);

        device.parameter_value("On");
        device.parameter_value("On");
        device.set_enabled(false);
        assert_eq!(behavior.refreshed.load(Ordering::SeqCst), 2);
        assert!(behavior.stopped.load(Ordering::SeqCst));
    }
}
