//! Nightshift - cron-driven workload autoscaler
//!
//! Scales Kubernetes and OpenShift workloads up and down on operator
//! defined schedules:
//! - Schedule rules parsed from workload annotations or scanner defaults
//! - Pluggable scanners per workload kind (deployment, statefulset,
//!   deploymentconfig)
//! - Save/restore of pre-scale replica counts via workload annotations
//! - Resync and watch loops feeding a shared object store
//! - Prometheus metrics and webhook triggers

pub mod domain;
pub mod infrastructure;
pub mod services;
