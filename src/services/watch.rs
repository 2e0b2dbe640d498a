//! Watch workers.
//!
//! One worker per watch-capable scanner. Events are applied to the object
//! store as they arrive; a broken stream is reopened after exponential
//! backoff (base 1 s, cap 60 s), resetting once a connection is healthy.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::domain::ports::scanner::{ObjectEvent, Scanner};
use crate::infrastructure::metrics::Metrics;
use crate::services::object_store::ObjectStore;

fn reconnect_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(60),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

pub struct WatchLoop {
    store: Arc<ObjectStore>,
    metrics: Arc<Metrics>,
}

impl WatchLoop {
    pub fn new(store: Arc<ObjectStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// Consume the scanner's watch stream until shutdown, reconnecting on
    /// stream errors.
    pub async fn run(self, scanner: Arc<dyn Scanner>, mut shutdown: broadcast::Receiver<()>) {
        let kind = scanner.kind();
        let mut backoff = reconnect_backoff();
        loop {
            let Some(source) = scanner.as_watch_source() else {
                return;
            };
            match source.watch().await {
                Ok(mut stream) => {
                    info!(%kind, "watch stream connected");
                    backoff.reset();
                    loop {
                        tokio::select! {
                            _ = shutdown.recv() => {
                                info!(%kind, "watch worker stopped");
                                return;
                            }
                            item = stream.next() => match item {
                                Some(Ok(event)) => self.apply(event),
                                Some(Err(err)) => {
                                    self.metrics.watch_event_error.inc();
                                    warn!(%kind, error = %err, "watch stream error");
                                    break;
                                }
                                None => {
                                    debug!(%kind, "watch stream ended");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(%kind, error = %err, "failed to open watch stream");
                }
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or_else(|| Duration::from_secs(60));
            self.metrics.watch_retries.inc();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!(%kind, "watch worker stopped");
                    return;
                }
            }
        }
    }

    fn apply(&self, event: ObjectEvent) {
        match event {
            ObjectEvent::Add(obj) => {
                // An add whose rules vanished downgrades to a removal;
                // rule-less objects are never stored.
                if obj.schedule.is_empty() {
                    self.store.remove(&obj.key());
                } else {
                    debug!(namespace = %obj.namespace, name = %obj.name, "watch add");
                    self.store.upsert(obj);
                }
            }
            ObjectEvent::Remove(obj) => {
                debug!(namespace = %obj.namespace, name = %obj.name, "watch remove");
                self.store.remove(&obj.key());
            }
        }
    }
}
