//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides (`NIGHTSHIFT_*`)
//! - Validation after merge

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
