//! Infrastructure layer
//!
//! Adapters for external dependencies: the cluster API (scanners),
//! configuration loading, logging, metrics, webhook triggers and the
//! exposition HTTP server.

pub mod config;
pub mod kubernetes;
pub mod logging;
pub mod metrics;
pub mod scanners;
pub mod triggers;
pub mod web;
