//! Domain errors for the Nightshift controller.

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::domain::models::object::WorkloadKind;

/// Errors raised when parsing or evaluating a schedule rule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid schedule rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("invalid state value '{0}', expected 'save' or 'restore'")]
    InvalidState(String),

    #[error("schedule has no replicas setting")]
    MissingReplicas,

    #[error("no firing time within one year after {0}")]
    NoNextTime(DateTime<Local>),
}

/// Transient cluster-API failures. Counted and logged by the worker that
/// hit them, retried by the next resync or tick; never fatal.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("kubernetes api request failed: {0}")]
    Api(#[from] kube::Error),

    #[error("watch stream failed: {0}")]
    Watch(String),

    #[error("malformed {kind} object: {reason}")]
    Malformed { kind: WorkloadKind, reason: String },
}

/// A restore was requested for an object that never saved state.
#[derive(Debug, Error)]
#[error("no saved state available for {namespace}/{name}")]
pub struct StateError {
    pub namespace: String,
    pub name: String,
}
