//! Configuration model.
//!
//! Loaded by `infrastructure::config::ConfigLoader` through figment, so
//! every field needs serde defaults that match `Default`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::models::object::WorkloadKind;
use crate::domain::models::schedule::Schedule;

/// Main configuration structure for Nightshift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Seconds between full resyncs; 0 disables the resync loop.
    #[serde(default)]
    pub resync_interval_secs: u64,

    /// Seconds between scale ticks.
    #[serde(default = "default_scale_interval_secs")]
    pub scale_interval_secs: u64,

    /// Path to a kubeconfig file; unset means in-cluster inference.
    #[serde(default)]
    pub kubeconfig: Option<String>,

    /// Scanner configurations, one per managed workload set.
    #[serde(default)]
    pub scanners: Vec<ScannerConfig>,

    /// Trigger configurations.
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics/health exposition configuration.
    #[serde(default)]
    pub web: WebConfig,
}

const fn default_scale_interval_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resync_interval_secs: 0,
            scale_interval_secs: default_scale_interval_secs(),
            kubeconfig: None,
            scanners: vec![],
            triggers: vec![],
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
        }
    }
}

impl Config {
    /// Resync period, or `None` when disabled.
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }

    pub fn scale_interval(&self) -> Duration {
        Duration::from_secs(self.scale_interval_secs)
    }
}

/// Configuration of one scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScannerConfig {
    /// Which workload kind this scanner manages.
    pub kind: WorkloadKind,

    /// Namespace to scan; unset means all namespaces.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Label selector restricting the scan.
    #[serde(default)]
    pub label: Option<String>,

    /// Default rules applied to workloads without a schedule annotation.
    #[serde(default)]
    pub schedule: Vec<Schedule>,
}

/// Configuration of one trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TriggerConfig {
    /// Id rules refer to via `triggers=`.
    pub id: String,

    /// Trigger kind; `webhook` is the only shipped kind.
    #[serde(default = "default_trigger_kind")]
    pub kind: String,

    /// Target URL for webhook triggers.
    #[serde(default)]
    pub url: Option<String>,

    /// HTTP method for webhook triggers.
    #[serde(default = "default_trigger_method")]
    pub method: String,

    /// Request timeout in seconds.
    #[serde(default = "default_trigger_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_trigger_kind() -> String {
    "webhook".to_string()
}

fn default_trigger_method() -> String {
    "POST".to_string()
}

const fn default_trigger_timeout_secs() -> u64 {
    10
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json, pretty.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics/health HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WebConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_listen_addr(),
        }
    }
}
