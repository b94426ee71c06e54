//! Ordered change notification for casa
//!
//! The ChangeNotifier delivers [`DeviceEvent`]s to registered listeners,
//! synchronously and on the caller's thread. Parameter changes are
//! delivered inside a value store update boundary so every listener sees
//! the same settled value. A listener that fails, by returning an error or
//! by panicking, is logged and skipped; the remaining listeners still run.

use casa_core::DeviceEvent;
use casa_value_store::ValueStore;
use indexmap::IndexMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, trace};

/// Outcome of a listener callback
pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A unique identifier for a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Receiver of device events
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &DeviceEvent) -> ListenerResult;
}

impl<F> Listener for F
where
    F: Fn(&DeviceEvent) -> ListenerResult + Send + Sync,
{
    fn on_event(&self, event: &DeviceEvent) -> ListenerResult {
        self(event)
    }
}

/// Multicast of device events to registered listeners
///
/// Listeners are invoked in registration order. Removing a listener moves
/// the most recently registered one into its slot, so the order stays
/// deterministic for any fixed set of listeners while removal stays O(1).
pub struct ChangeNotifier {
    store: Arc<ValueStore>,
    listeners: RwLock<IndexMap<ListenerId, Arc<dyn Listener>>>,
    next_listener_id: AtomicU64,
}

impl ChangeNotifier {
    pub fn new(store: Arc<ValueStore>) -> Self {
        Self {
            store,
            listeners: RwLock::new(IndexMap::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// The value store whose boundaries scope parameter notifications
    pub fn store(&self) -> &Arc<ValueStore> {
        &self.store
    }

    /// Register a listener
    pub fn add_listener(&self, listener: impl Listener + 'static) -> ListenerId {
        self.add_shared_listener(Arc::new(listener))
    }

    /// Register a listener that is shared with other owners
    pub fn add_shared_listener(&self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        trace!(listener = id.0, "Listener added");
        id
    }

    /// Unregister a listener, returning whether it was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .swap_remove(&id)
            .is_some();
        trace!(listener = id.0, removed, "Listener removed");
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver a parameter change inside an update boundary
    pub fn notify_changed(&self, event: &DeviceEvent) {
        let _boundary = self.store.begin_update();
        self.deliver(event);
    }

    /// Deliver an event outside of any update boundary
    ///
    /// Used for lifecycle events (enabled, updated, added, removed) that do
    /// not carry a parameter value.
    pub fn notify(&self, event: &DeviceEvent) {
        self.deliver(event);
    }

    fn deliver(&self, event: &DeviceEvent) {
        // Snapshot so listeners may (un)register without deadlocking
        let listeners: Vec<(ListenerId, Arc<dyn Listener>)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        debug!(
            device_id = %event.device_id(),
            listeners = listeners.len(),
            "Notifying listeners"
        );

        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(listener = id.0, device_id = %event.device_id(), error = %e, "Listener failed");
                }
                Err(_) => {
                    error!(listener = id.0, device_id = %event.device_id(), "Listener panicked");
                }
            }
        }
    }
}

/// Thread-safe wrapper for ChangeNotifier
pub type SharedChangeNotifier = Arc<ChangeNotifier>;

#[cfg(test)]
mod tests {
    use super::*;
    use casa_core::{DeviceId, Parameter};
    use serde_json::json;
    use std::sync::Mutex;

    fn changed(device: &str) -> DeviceEvent {
        let p = Parameter::boolean("On");
        DeviceEvent::ParameterChanged {
            device_id: DeviceId::from(device),
            parameter: p.name().to_string(),
            parameter_id: p.id(),
            value: Some(json!(true)),
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> impl Listener {
        let log = Arc::clone(log);
        move |_: &DeviceEvent| -> ListenerResult {
            log.lock().unwrap().push(tag);
            Ok(())
        }
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let notifier = ChangeNotifier::new(Arc::new(ValueStore::new()));
        let log = Arc::new(Mutex::new(Vec::new()));
        notifier.add_listener(recorder(&log, "a"));
        notifier.add_listener(recorder(&log, "b"));
        notifier.add_listener(recorder(&log, "c"));

        notifier.notify_changed(&changed("d1"));
        notifier.notify_changed(&changed("d1"));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn test_failing_listeners_are_isolated() {
        let notifier = ChangeNotifier::new(Arc::new(ValueStore::new()));
        let log = Arc::new(Mutex::new(Vec::new()));
        notifier.add_listener(|_: &DeviceEvent| -> ListenerResult { Err("boom".into()) });
        notifier.add_listener(|_: &DeviceEvent| -> ListenerResult { panic!("listener bug") });
        notifier.add_listener(recorder(&log, "ok"));

        notifier.notify_changed(&changed("d1"));
        assert_eq!(*log.lock().unwrap(), vec!["ok"]);
        assert!(!notifier.store().is_updating());
    }

    #[test]
    fn test_changes_are_delivered_inside_a_boundary() {
        let store = Arc::new(ValueStore::new());
        let notifier = ChangeNotifier::new(Arc::clone(&store));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let observed = Arc::clone(&store);
        let sink = Arc::clone(&seen);
        notifier.add_listener(move |_: &DeviceEvent| -> ListenerResult {
            sink.lock().unwrap().push(observed.is_updating());
            Ok(())
        });

        notifier.notify_changed(&changed("d1"));
        notifier.notify(&DeviceEvent::Updated {
            device_id: DeviceId::from("d1"),
        });
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_remove_listener() {
        let notifier = ChangeNotifier::new(Arc::new(ValueStore::new()));
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = notifier.add_listener(recorder(&log, "a"));
        notifier.add_listener(recorder(&log, "b"));

        assert!(notifier.remove_listener(a));
        assert!(!notifier.remove_listener(a));
        assert_eq!(notifier.listener_count(), 1);

        notifier.notify(&changed("d1"));
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
    }
}
