//! Managed workload model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::models::schedule::Schedule;

/// Workload kinds the controller can manage. Each kind is owned by exactly
/// one scanner implementation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DeploymentConfig,
}

impl WorkloadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::StatefulSet => "statefulset",
            Self::DeploymentConfig => "deploymentconfig",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deployment" => Ok(Self::Deployment),
            "statefulset" => Ok(Self::StatefulSet),
            "deploymentconfig" => Ok(Self::DeploymentConfig),
            _ => Err(format!("unknown workload kind '{s}'")),
        }
    }
}

/// Replica count snapshotted by a `state=save` firing. Persisted on the
/// workload itself (as an annotation) so it survives controller restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedState {
    pub replicas: i32,
}

/// Store identity of a managed workload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub kind: WorkloadKind,
    pub uid: String,
}

/// A managed workload as observed by a scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Object {
    pub namespace: String,
    pub uid: String,
    pub name: String,
    pub kind: WorkloadKind,
    pub schedule: Vec<Schedule>,
    pub replicas: i32,
    pub state: Option<SavedState>,
}

impl Object {
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            kind: self.kind,
            uid: self.uid.clone(),
        }
    }
}
