//! Scanner port.
//!
//! A scanner maps one workload kind (deployment, statefulset,
//! deploymentconfig) onto the controller's object model. The capability
//! set is list/scale/save-state/load-state; streaming change events is an
//! optional secondary contract probed through [`Scanner::as_watch_source`].

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::errors::BackendError;
use crate::domain::models::config::ScannerConfig;
use crate::domain::models::object::{Object, SavedState, WorkloadKind};

/// Change event emitted by a watch stream.
///
/// `Remove` is emitted on delete and when an object's rules disappear;
/// `Add` on first sight and whenever rules appear or change.
#[derive(Debug, Clone)]
pub enum ObjectEvent {
    Add(Object),
    Remove(Object),
}

/// Stream of change events from a watch-capable scanner.
pub type WatchStream = BoxStream<'static, Result<ObjectEvent, BackendError>>;

#[async_trait]
pub trait Scanner: Send + Sync {
    /// The workload kind this scanner owns.
    fn kind(&self) -> WorkloadKind;

    /// The configuration this scanner was created with.
    fn config(&self) -> &ScannerConfig;

    /// List every managed workload in the configured namespace matching
    /// the label selector. Workloads without rules (no annotation and no
    /// scanner defaults) and workloads annotated `ignore=true` are
    /// omitted.
    async fn list(&self) -> Result<Vec<Object>, BackendError>;

    /// Set the replica count on the underlying workload. Scaling to the
    /// current value is a no-op success.
    async fn scale(&self, obj: &Object, replicas: i32) -> Result<(), BackendError>;

    /// Persist the current replica count as an annotation on the workload
    /// and return the saved value.
    async fn save_state(&self, obj: &Object) -> Result<i32, BackendError>;

    /// Read a previously saved replica count from the workload annotation.
    async fn load_state(&self, obj: &Object) -> Result<Option<SavedState>, BackendError>;

    /// Probe for the optional watch capability.
    fn as_watch_source(&self) -> Option<&dyn WatchSource> {
        None
    }
}

/// Optional capability: stream change events from the cluster.
#[async_trait]
pub trait WatchSource: Send + Sync {
    /// Open a watch stream. The caller owns reconnecting: a stream error
    /// or end-of-stream means the connection is gone.
    async fn watch(&self) -> Result<WatchStream, BackendError>;
}
