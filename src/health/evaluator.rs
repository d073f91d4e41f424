//! Staleness and health classification
//!
//! Classification is a pure function over a binding snapshot and a point in
//! time. It never touches the registry and never schedules anything, so the
//! same snapshot and instant always produce the same answer.

use std::time::{Duration, Instant};

use crate::config::HealthConfig;
use crate::registry::{BindingRole, BindingState, ReplicaBinding};

/// Health classification of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Source side of a replication relationship; not refreshed
    Primary,
    Healthy,
    /// No refresh has ever completed
    NeverRefreshed,
    /// Last successful refresh is older than the staleness threshold
    StaleData,
    /// A scheduled refresh is overdue by more than one interval
    RefreshOverdue,
    /// Taken out of service
    Unavailable,
    /// Not yet determinable (still provisioning)
    Unknown,
}

impl Health {
    /// Label used for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Health::Primary => "primary",
            Health::Healthy => "healthy",
            Health::NeverRefreshed => "never_refreshed",
            Health::StaleData => "stale_data",
            Health::RefreshOverdue => "refresh_overdue",
            Health::Unavailable => "unavailable",
            Health::Unknown => "unknown",
        }
    }

    /// Anything an operator should look at
    pub fn needs_attention(&self) -> bool {
        !matches!(self, Health::Healthy | Health::Primary)
    }
}

/// Tunable classification thresholds
#[derive(Debug, Clone)]
pub struct HealthPolicy {
    /// Age of the last successful refresh before data counts as stale
    pub stale_threshold: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            stale_threshold: Duration::from_secs(24 * 3600),
        }
    }
}

impl From<&HealthConfig> for HealthPolicy {
    fn from(config: &HealthConfig) -> Self {
        Self {
            stale_threshold: config.stale_threshold(),
        }
    }
}

/// Classify a binding snapshot at `now`; first matching rule wins
pub fn classify(binding: &ReplicaBinding, now: Instant, policy: &HealthPolicy) -> Health {
    if binding.role == BindingRole::Primary {
        return Health::Primary;
    }
    match binding.state {
        BindingState::Provisioning => return Health::Unknown,
        BindingState::Unavailable => return Health::Unavailable,
        BindingState::Available | BindingState::Refreshing => {}
    }

    // Staleness counts from the last successful refresh; failed attempts
    // move the backoff anchor but never make a replica look fresher
    let Some(succeeded) = binding.last_success_at else {
        return Health::NeverRefreshed;
    };
    let age = now.saturating_duration_since(succeeded);

    if age > policy.stale_threshold {
        return Health::StaleData;
    }
    if let Some(interval) = binding.refresh_interval {
        if age > interval {
            return Health::RefreshOverdue;
        }
    }
    Health::Healthy
}
