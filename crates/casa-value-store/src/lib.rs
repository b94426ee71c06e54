//! Shared parameter value storage for casa
//!
//! This crate provides the ValueStore, which holds the current value of
//! every parameter of every device in a deployment. Values are keyed by
//! parameter identity, not by name, so equally named parameters of two
//! devices never collide.
//!
//! The store also defines the notification boundary. Callers open a
//! boundary with [`ValueStore::begin_update`] before announcing a change
//! and it closes when the returned guard is dropped. Boundaries nest and
//! may be held by many callers at once; there is no global exclusive lock.
//! Each time the outermost boundary closes the store bumps an update
//! generation that consumers can await through
//! [`ValueStore::subscribe_updates`].

use casa_core::{Parameter, ParameterId, Value};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{instrument, trace};

/// Current parameter values of a deployment
pub struct ValueStore {
    /// Normalized values keyed by parameter identity
    values: DashMap<ParameterId, Value>,
    /// Number of open update boundaries
    depth: AtomicUsize,
    /// Generation counter, bumped when the outermost boundary closes
    generation: watch::Sender<u64>,
}

impl ValueStore {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            values: DashMap::new(),
            depth: AtomicUsize::new(0),
            generation,
        }
    }

    /// Get the value recorded for a parameter
    ///
    /// `None` means no value was ever recorded, which is distinct from a
    /// recorded null.
    pub fn get_value(&self, parameter: &Parameter) -> Option<Value> {
        self.get(&parameter.id())
    }

    /// Get the value recorded under a parameter identity
    pub fn get(&self, id: &ParameterId) -> Option<Value> {
        self.values.get(id).map(|v| v.clone())
    }

    /// Store the normalized form of `value` for a parameter
    ///
    /// The value is stored unconditionally and no notification is fired;
    /// comparing with the previous value is the caller's job. Returns the
    /// normalized value.
    #[instrument(skip(self, parameter, value), fields(parameter = %parameter.name()))]
    pub fn set_value(&self, parameter: &Parameter, value: &Value) -> Value {
        let normalized = parameter.normalize(value);
        trace!(value = %normalized, "Storing parameter value");
        self.values.insert(parameter.id(), normalized.clone());
        normalized
    }

    /// Store a normalized value only if it differs from the current one
    ///
    /// The compare and the insert happen under the entry lock, so among
    /// concurrent writers of the same value exactly one sees `Some`. A
    /// missing value counts as null. Returns the stored value.
    pub fn replace_if_changed(&self, parameter: &Parameter, value: &Value) -> Option<Value> {
        let normalized = parameter.normalize(value);
        match self.values.entry(parameter.id()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() == normalized {
                    return None;
                }
                entry.insert(normalized.clone());
            }
            Entry::Vacant(entry) => {
                if normalized == Value::Null {
                    return None;
                }
                entry.insert(normalized.clone());
            }
        }
        trace!(parameter = %parameter.name(), value = %normalized, "Replaced parameter value");
        Some(normalized)
    }

    /// Forget the value recorded under a parameter identity
    pub fn remove(&self, id: &ParameterId) -> Option<Value> {
        self.values.remove(id).map(|(_, v)| v)
    }

    pub fn contains(&self, id: &ParameterId) -> bool {
        self.values.contains_key(id)
    }

    /// Number of recorded values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Open a notification boundary
    ///
    /// The boundary closes when the guard is dropped.
    pub fn begin_update(&self) -> UpdateGuard<'_> {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(depth, "Begin update");
        UpdateGuard { store: self }
    }

    /// True while at least one boundary is open
    pub fn is_updating(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    /// Current update generation
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Watch the update generation
    ///
    /// The receiver is signalled each time all open boundaries have closed,
    /// i.e. whenever the store has settled after a batch of changes.
    pub fn subscribe_updates(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    fn end_update(&self) {
        let previous = self.depth.fetch_sub(1, Ordering::SeqCst);
        trace!(depth = previous - 1, "End update");
        if previous == 1 {
            self.generation.send_modify(|g| *g += 1);
        }
    }
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new()
    }
}

/// An open notification boundary
///
/// Dropping the guard closes the boundary, including on early return or
/// unwinding out of a listener.
#[must_use = "the update boundary closes as soon as the guard is dropped"]
pub struct UpdateGuard<'a> {
    store: &'a ValueStore,
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.store.end_update();
    }
}

/// Thread-safe wrapper for ValueStore
pub type SharedValueStore = Arc<ValueStore>;
