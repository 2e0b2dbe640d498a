//! The `nightshift.*` workload annotations.
//!
//! This is the authoritative boundary with the cluster:
//! - `joyrex2001.com/nightshift.ignore`: "true"/"false"/"" (case-insensitive)
//! - `joyrex2001.com/nightshift.schedule`: `;`-separated rule strings
//! - `joyrex2001.com/nightshift.state`: controller-written replica snapshot

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::warn;

use crate::domain::errors::ScheduleError;
use crate::domain::models::config::ScannerConfig;
use crate::domain::models::object::{Object, SavedState};
use crate::domain::models::schedule::Schedule;

pub const IGNORE_ANNOTATION: &str = "joyrex2001.com/nightshift.ignore";
pub const SCHEDULE_ANNOTATION: &str = "joyrex2001.com/nightshift.schedule";
pub const STATE_ANNOTATION: &str = "joyrex2001.com/nightshift.state";

/// Malformed annotation content. The offending workload is omitted from
/// ingestion; the controller carries on.
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("invalid value '{0}' for nightshift.ignore")]
    InvalidIgnore(String),

    #[error("invalid value '{0}' for nightshift.state")]
    InvalidState(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Resolve the rule set for a workload: the schedule annotation when
/// present, else the scanner's defaults. Ignored workloads and workloads
/// without any rules come back with an empty rule set.
pub fn schedule_from_annotations(
    annotations: &BTreeMap<String, String>,
    defaults: &[Schedule],
) -> Result<Vec<Schedule>, AnnotationError> {
    let ignore = annotations
        .get(IGNORE_ANNOTATION)
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ignore.as_str() {
        "true" => return Ok(Vec::new()),
        "" | "false" => {}
        other => return Err(AnnotationError::InvalidIgnore(other.to_string())),
    }

    match annotations.get(SCHEDULE_ANNOTATION) {
        Some(annotation) if !annotation.is_empty() => parse_schedule_annotation(annotation),
        _ => Ok(defaults.to_vec()),
    }
}

/// Convert the `;`-separated schedule annotation into rules, skipping
/// empty segments.
fn parse_schedule_annotation(annotation: &str) -> Result<Vec<Schedule>, AnnotationError> {
    let mut rules = Vec::new();
    for segment in annotation.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        rules.push(segment.parse::<Schedule>()?);
    }
    Ok(rules)
}

/// Read a previously saved replica snapshot.
pub fn state_from_annotations(
    annotations: &BTreeMap<String, String>,
) -> Result<Option<SavedState>, AnnotationError> {
    match annotations.get(STATE_ANNOTATION) {
        Some(value) if !value.is_empty() => {
            let replicas = value
                .trim()
                .parse::<i32>()
                .map_err(|_| AnnotationError::InvalidState(value.clone()))?;
            Ok(Some(SavedState { replicas }))
        }
        _ => Ok(None),
    }
}

/// Build a store object from the pieces every scanner has at hand. The
/// rule set may come back empty (ignored, or no rules anywhere); the
/// caller decides whether that means "skip" (listing) or "remove"
/// (watching).
pub fn object_from_parts(
    config: &ScannerConfig,
    namespace: String,
    uid: String,
    name: String,
    annotations: &BTreeMap<String, String>,
    replicas: i32,
) -> Result<Object, AnnotationError> {
    let schedule = schedule_from_annotations(annotations, &config.schedule)?;
    let state = state_from_annotations(annotations).unwrap_or_else(|err| {
        warn!(%namespace, %name, error = %err, "ignoring malformed state annotation");
        None
    });
    Ok(Object {
        namespace,
        uid,
        name,
        kind: config.kind,
        schedule,
        replicas,
        state,
    })
}
