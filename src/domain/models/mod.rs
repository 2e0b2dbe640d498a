//! Domain models
//!
//! Pure domain entities: schedule rules, managed workload objects, and the
//! configuration they are wired up from.

pub mod config;
pub mod object;
pub mod schedule;

pub use config::{Config, LoggingConfig, ScannerConfig, TriggerConfig, WebConfig};
pub use object::{Object, ObjectKey, SavedState, WorkloadKind};
pub use schedule::{Schedule, StateTransition};
