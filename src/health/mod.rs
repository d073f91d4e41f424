//! Replica health classification and monitoring
//!
//! This module provides:
//! - Pure staleness/health classification of binding snapshots
//! - A low-frequency background evaluation loop feeding the alert dispatcher
//! - The stuck-refresh watchdog

mod evaluator;
mod monitor;

pub use evaluator::{classify, Health, HealthPolicy};
pub use monitor::HealthMonitor;
