//! castor — cross-region database replication controller
//!
//! Schedules replica refreshes against an external transport provider,
//! enforces at-most-one-refresh-in-flight per binding via compare-and-swap
//! state transitions, classifies replica staleness, and emits edge-triggered
//! alerts.

pub mod alert;
pub mod config;
pub mod controller;
pub mod executor;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod transport;
