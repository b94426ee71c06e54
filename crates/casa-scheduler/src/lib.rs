//! Periodic bulk refresh for casa
//!
//! The PollingScheduler keeps a registry of entities whose state lives in
//! an external service. On every period it collects the entities that are
//! valid, enabled and in use, hands them to a [`BulkRefresher`] in a single
//! batch, and applies the returned values back to each entity.
//!
//! Entities join at any time and are refreshed once as soon as they join.
//! Unregistering an entity cancels its future refreshes; a refresh already
//! in flight completes and is applied through the entity's own update path.

use async_trait::async_trait;
use casa_core::Fields;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, trace, warn};

/// Default refresh period
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(600);

/// An entity refreshed from an external source
pub trait Pollable: Send + Sync + 'static {
    /// Key identifying the entity in the scheduler and in refresh results
    fn poll_key(&self) -> String;

    fn is_valid(&self) -> bool;

    fn is_enabled(&self) -> bool;

    /// Whether some consumer currently cares about the entity's values
    fn is_in_use(&self) -> bool;

    /// Whether the entity takes part in the next refresh
    fn is_due(&self) -> bool {
        self.is_valid() && self.is_enabled() && self.is_in_use()
    }

    /// Apply freshly fetched values
    fn apply_refresh(&self, values: &Fields);
}

/// Fetches current values for a batch of entities
///
/// Results are keyed by [`Pollable::poll_key`]. Entities missing from the
/// result are left untouched.
#[async_trait]
pub trait BulkRefresher<T: Pollable>: Send + Sync {
    async fn refresh(&self, batch: &[Arc<T>]) -> HashMap<String, Fields>;
}

/// Periodic refresh of a set of entities
pub struct PollingScheduler<T: Pollable> {
    name: String,
    period: Duration,
    entities: RwLock<IndexMap<String, Arc<T>>>,
    refresher: Arc<dyn BulkRefresher<T>>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl<T: Pollable> PollingScheduler<T> {
    pub fn new(
        name: impl Into<String>,
        period: Duration,
        refresher: Arc<dyn BulkRefresher<T>>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            name: name.into(),
            period,
            entities: RwLock::new(IndexMap::new()),
            refresher,
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Add an entity and refresh it immediately
    ///
    /// Registering a key that is already present replaces the entity.
    #[instrument(skip(self, entity), fields(scheduler = %self.name, key = %entity.poll_key()))]
    pub async fn register(&self, entity: Arc<T>) {
        let key = entity.poll_key();
        let replaced = self
            .entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&entity))
            .is_some();
        debug!(replaced, "Entity registered");

        if entity.is_due() {
            self.refresh_batch(vec![entity]).await;
        }
    }

    /// Remove an entity, cancelling its future refreshes
    pub fn unregister(&self, key: &str) -> Option<Arc<T>> {
        let removed = self
            .entities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(key);
        if removed.is_some() {
            debug!(scheduler = %self.name, key, "Entity unregistered");
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entities that take part in the next refresh, in registration order
    pub fn due(&self) -> Vec<Arc<T>> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.is_due())
            .cloned()
            .collect()
    }

    /// Run one refresh cycle, returning the number of entities refreshed
    pub async fn tick(&self) -> usize {
        let batch = self.due();
        if batch.is_empty() {
            trace!(scheduler = %self.name, "Nothing to refresh");
            return 0;
        }
        self.refresh_batch(batch).await
    }

    async fn refresh_batch(&self, batch: Vec<Arc<T>>) -> usize {
        debug!(scheduler = %self.name, entities = batch.len(), "Refreshing");
        let mut results = self.refresher.refresh(&batch).await;

        let mut applied = 0;
        for entity in &batch {
            if let Some(values) = results.remove(&entity.poll_key()) {
                entity.apply_refresh(&values);
                applied += 1;
            }
        }
        if !results.is_empty() {
            warn!(
                scheduler = %self.name,
                unknown = results.len(),
                "Refresh returned values for entities outside the batch"
            );
        }
        applied
    }

    /// Start the periodic refresh loop
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(scheduler = %self.name, "Scheduler already running");
            return;
        }

        info!(scheduler = %self.name, period = ?self.period, "Starting scheduler");
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let scheduler = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; joining already refreshed
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        scheduler.tick().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!(scheduler = %scheduler.name, "Received shutdown signal");
                        break;
                    }
                }
            }

            info!(scheduler = %scheduler.name, "Scheduler stopped");
        });
    }

    /// Stop the periodic refresh loop
    ///
    /// The scheduler counts as stopped on return and may be started again
    /// right away; the old loop winds down on its own.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(scheduler = %self.name, "Stopping scheduler");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Thread-safe wrapper for PollingScheduler
pub type SharedPollingScheduler<T> = Arc<PollingScheduler<T>>;
