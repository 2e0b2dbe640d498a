//! The controller agent.
//!
//! Owns the object store and the configured scanners, triggers and
//! metrics, and spawns the worker set: one resync worker (which also
//! seeds the store at startup), one scale worker, and one watch worker
//! per watch-capable scanner. A single broadcast stop signal shuts all
//! of them down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::ports::scanner::Scanner;
use crate::domain::ports::trigger::TriggerRegistry;
use crate::infrastructure::metrics::Metrics;
use crate::services::object_store::ObjectStore;
use crate::services::resync::ResyncLoop;
use crate::services::scale_loop::ScaleLoop;
use crate::services::watch::WatchLoop;

pub struct Agent {
    store: Arc<ObjectStore>,
    scanners: Vec<Arc<dyn Scanner>>,
    triggers: Arc<TriggerRegistry>,
    metrics: Arc<Metrics>,
    resync_interval: Option<Duration>,
    scale_interval: Duration,
}

impl Agent {
    pub fn new(
        scanners: Vec<Arc<dyn Scanner>>,
        triggers: Arc<TriggerRegistry>,
        metrics: Arc<Metrics>,
        resync_interval: Option<Duration>,
        scale_interval: Duration,
    ) -> Self {
        Self {
            store: Arc::new(ObjectStore::new()),
            scanners,
            triggers,
            metrics,
            resync_interval,
            scale_interval,
        }
    }

    pub fn store(&self) -> Arc<ObjectStore> {
        self.store.clone()
    }

    /// Spawn all workers. Each subscribes to the given shutdown channel
    /// and drains in-flight work before exiting; the scale worker exits
    /// at tick boundaries.
    pub fn spawn(&self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let resync = ResyncLoop::new(
            self.store.clone(),
            self.scanners.clone(),
            self.metrics.clone(),
        );
        handles.push(tokio::spawn(
            resync.run(self.resync_interval, shutdown.subscribe()),
        ));

        let scale = ScaleLoop::new(
            self.store.clone(),
            self.scanners.clone(),
            self.triggers.clone(),
            self.metrics.clone(),
        );
        handles.push(tokio::spawn(
            scale.run(self.scale_interval, shutdown.subscribe()),
        ));

        for scanner in &self.scanners {
            if scanner.as_watch_source().is_some() {
                let watcher = WatchLoop::new(self.store.clone(), self.metrics.clone());
                handles.push(tokio::spawn(
                    watcher.run(scanner.clone(), shutdown.subscribe()),
                ));
            }
        }

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::object::{Object, WorkloadKind};
    use crate::services::testing::{test_metrics, MockScanner};

    #[tokio::test]
    async fn test_agent_seeds_store_and_shuts_down() {
        let scanner = Arc::new(MockScanner::new(vec![Object {
            namespace: "shop".to_string(),
            uid: "a".to_string(),
            name: "app-a".to_string(),
            kind: WorkloadKind::Deployment,
            schedule: vec!["0 22 * * * replicas=0".parse().unwrap()],
            replicas: 3,
            state: None,
        }]));
        let agent = Agent::new(
            vec![scanner],
            Arc::new(TriggerRegistry::new()),
            test_metrics(),
            None,
            Duration::from_secs(30),
        );

        let (shutdown_tx, _) = broadcast::channel(1);
        let handles = agent.spawn(&shutdown_tx);

        let store = agent.store();
        for _ in 0..100 {
            if store.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.len(), 1);

        shutdown_tx.send(()).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
