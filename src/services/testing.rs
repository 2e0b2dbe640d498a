//! Shared test doubles for the service-layer unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::domain::errors::BackendError;
use crate::domain::models::config::ScannerConfig;
use crate::domain::models::object::{Object, SavedState, WorkloadKind};
use crate::domain::ports::scanner::{ObjectEvent, Scanner, WatchSource, WatchStream};
use crate::domain::ports::trigger::Trigger;
use crate::infrastructure::metrics::Metrics;

pub fn test_metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new().expect("metrics must build"))
}

/// In-memory scanner double. Tracks a current replica count and a saved
/// "annotation" per workload name, and records every scale call.
pub struct MockScanner {
    config: ScannerConfig,
    objects: Mutex<Vec<Object>>,
    replicas: Mutex<HashMap<String, i32>>,
    saved: Mutex<HashMap<String, i32>>,
    scale_calls: Mutex<Vec<(String, i32)>>,
    watch_batches: Mutex<VecDeque<Vec<Result<ObjectEvent, BackendError>>>>,
    watchable: bool,
    fail_scale: bool,
    fail_list: bool,
}

impl MockScanner {
    pub fn new(objects: Vec<Object>) -> Self {
        let replicas = objects
            .iter()
            .map(|obj| (obj.name.clone(), obj.replicas))
            .collect();
        Self {
            config: ScannerConfig {
                kind: WorkloadKind::Deployment,
                namespace: None,
                label: None,
                schedule: vec![],
            },
            objects: Mutex::new(objects),
            replicas: Mutex::new(replicas),
            saved: Mutex::new(HashMap::new()),
            scale_calls: Mutex::new(Vec::new()),
            watch_batches: Mutex::new(VecDeque::new()),
            watchable: false,
            fail_scale: false,
            fail_list: false,
        }
    }

    pub fn failing_scale(mut self) -> Self {
        self.fail_scale = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// Arm the watch capability; each call to `watch()` serves the next
    /// batch, followed by a stream that stays open forever.
    pub fn with_watch(mut self, batches: Vec<Vec<Result<ObjectEvent, BackendError>>>) -> Self {
        self.watch_batches = Mutex::new(batches.into());
        self.watchable = true;
        self
    }

    pub fn set_objects(&self, objects: Vec<Object>) {
        *self.objects.lock().unwrap() = objects;
    }

    pub fn set_saved(&self, name: &str, replicas: i32) {
        self.saved.lock().unwrap().insert(name.to_string(), replicas);
    }

    pub fn scale_calls(&self) -> Vec<(String, i32)> {
        self.scale_calls.lock().unwrap().clone()
    }

    pub fn current_replicas(&self, name: &str) -> i32 {
        self.replicas.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    fn backend_failure(&self, reason: &str) -> BackendError {
        BackendError::Malformed {
            kind: self.config.kind,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Scanner for MockScanner {
    fn kind(&self) -> WorkloadKind {
        self.config.kind
    }

    fn config(&self) -> &ScannerConfig {
        &self.config
    }

    async fn list(&self) -> Result<Vec<Object>, BackendError> {
        if self.fail_list {
            return Err(self.backend_failure("list failure injected"));
        }
        Ok(self.objects.lock().unwrap().clone())
    }

    async fn scale(&self, obj: &Object, replicas: i32) -> Result<(), BackendError> {
        if self.fail_scale {
            return Err(self.backend_failure("scale failure injected"));
        }
        self.scale_calls
            .lock()
            .unwrap()
            .push((obj.name.clone(), replicas));
        self.replicas.lock().unwrap().insert(obj.name.clone(), replicas);
        Ok(())
    }

    async fn save_state(&self, obj: &Object) -> Result<i32, BackendError> {
        let replicas = self.current_replicas(&obj.name);
        self.set_saved(&obj.name, replicas);
        Ok(replicas)
    }

    async fn load_state(&self, obj: &Object) -> Result<Option<SavedState>, BackendError> {
        Ok(self
            .saved
            .lock()
            .unwrap()
            .get(&obj.name)
            .map(|&replicas| SavedState { replicas }))
    }

    fn as_watch_source(&self) -> Option<&dyn WatchSource> {
        self.watchable.then_some(self as &dyn WatchSource)
    }
}

#[async_trait]
impl WatchSource for MockScanner {
    async fn watch(&self) -> Result<WatchStream, BackendError> {
        let batch = self
            .watch_batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(stream::iter(batch).chain(stream::pending()).boxed())
    }
}

/// Trigger double counting invocations.
#[derive(Default)]
pub struct CountingTrigger {
    fired: AtomicUsize,
}

impl CountingTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fired(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Trigger for CountingTrigger {
    async fn fire(&self) -> anyhow::Result<()> {
        self.fired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
