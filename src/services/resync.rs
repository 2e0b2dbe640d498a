//! Periodic full resync.
//!
//! Relists every scanner and reconciles the object store: entries
//! belonging to a scanner that vanished from its fresh listing are
//! removed, everything listed is upserted. One failing scanner never
//! aborts the others.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::domain::models::object::{Object, ObjectKey};
use crate::domain::ports::scanner::Scanner;
use crate::infrastructure::metrics::Metrics;
use crate::services::object_store::ObjectStore;

pub struct ResyncLoop {
    store: Arc<ObjectStore>,
    scanners: Vec<Arc<dyn Scanner>>,
    metrics: Arc<Metrics>,
}

impl ResyncLoop {
    pub fn new(
        store: Arc<ObjectStore>,
        scanners: Vec<Arc<dyn Scanner>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            scanners,
            metrics,
        }
    }

    /// Seed the store once at startup, then resync on the configured
    /// cadence. `None` disables the periodic part.
    pub async fn run(self, interval: Option<Duration>, mut shutdown: broadcast::Receiver<()>) {
        self.resync_once().await;

        let Some(interval) = interval else {
            debug!("resync loop disabled, initial seed only");
            return;
        };

        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "resync loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => self.resync_once().await,
                _ = shutdown.recv() => {
                    info!("resync loop stopped");
                    return;
                }
            }
        }
    }

    /// One full relist-and-reconcile pass over all scanners.
    pub async fn resync_once(&self) {
        for scanner in &self.scanners {
            match scanner.list().await {
                Ok(fresh) => self.reconcile(scanner.as_ref(), fresh),
                Err(err) => {
                    self.metrics.resync_error.inc();
                    error!(
                        kind = %scanner.kind(),
                        error = %err,
                        "resync listing failed"
                    );
                }
            }
        }
    }

    fn reconcile(&self, scanner: &dyn Scanner, fresh: Vec<Object>) {
        let keys: HashSet<ObjectKey> = fresh.iter().map(Object::key).collect();
        let removed = self.store.remove_stale(
            scanner.kind(),
            scanner.config().namespace.as_deref(),
            &keys,
        );
        if removed > 0 {
            debug!(kind = %scanner.kind(), removed, "dropped vanished objects");
        }
        for obj in fresh {
            // Rule-less objects are never stored.
            if obj.schedule.is_empty() {
                continue;
            }
            self.store.upsert(obj);
        }
    }
}
