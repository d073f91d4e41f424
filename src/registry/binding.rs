//! Binding state definitions for replica refresh tracking
//!
//! A `ReplicaBinding` is the unit the controller operates on: one configured
//! primary→replica relationship plus everything observed about its refresh
//! history. All mutation happens inside the registry's transition methods.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;

/// Unique key for a primary→replica relationship
///
/// The same database name may be replicated to several secondary locators,
/// and a secondary locator may host replicas of many databases, so all three
/// parts are needed to identify a binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingId {
    /// Account locator of the primary
    pub primary_locator: String,
    /// Database name on the primary
    pub database: String,
    /// Account locator hosting the replica
    pub secondary_locator: String,
}

impl BindingId {
    pub fn new(
        primary_locator: impl Into<String>,
        database: impl Into<String>,
        secondary_locator: impl Into<String>,
    ) -> Self {
        Self {
            primary_locator: primary_locator.into(),
            database: database.into(),
            secondary_locator: secondary_locator.into(),
        }
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}->{}",
            self.primary_locator, self.database, self.secondary_locator
        )
    }
}

/// Role of a binding in the replication topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BindingRole {
    /// Source side; monitored for dashboards but never refreshed
    Primary,
    /// Replica side; subject to scheduling and health classification
    #[default]
    Replica,
}

/// Lifecycle state of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Registered but the replica database does not exist yet
    Provisioning,
    /// Idle and eligible for scheduling
    Available,
    /// Exactly one refresh attempt is in flight
    Refreshing,
    /// Taken out of service by an operator
    Unavailable,
}

/// Outcome of the most recent refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshStatus {
    /// No attempt has completed yet
    #[default]
    None,
    Success,
    Failed,
}

/// One configured primary→replica relationship plus observed refresh state
#[derive(Debug, Clone)]
pub struct ReplicaBinding {
    pub id: BindingId,
    pub role: BindingRole,
    /// Opaque source-dataset identifier handed to the transport
    pub primary_ref: String,
    /// Absent means manual-only refresh
    pub refresh_interval: Option<Duration>,
    pub state: BindingState,
    pub last_refresh_started_at: Option<Instant>,
    /// End of the most recent attempt, successful or not; anchors the
    /// due check and failure backoff
    pub last_refresh_ended_at: Option<Instant>,
    /// End of the most recent successful refresh; anchors staleness
    pub last_success_at: Option<Instant>,
    pub last_refresh_status: RefreshStatus,
    /// Cleared on the next successful refresh
    pub last_error: Option<String>,
    /// Consecutive failed attempts; drives exponential backoff
    pub consecutive_failures: u32,
}

impl ReplicaBinding {
    /// Create a new binding in `Provisioning`
    pub fn new(
        id: BindingId,
        role: BindingRole,
        primary_ref: String,
        refresh_interval: Option<Duration>,
    ) -> Self {
        Self {
            id,
            role,
            primary_ref,
            refresh_interval,
            state: BindingState::Provisioning,
            last_refresh_started_at: None,
            last_refresh_ended_at: None,
            last_success_at: None,
            last_refresh_status: RefreshStatus::None,
            last_error: None,
            consecutive_failures: 0,
        }
    }

    /// Effective wait between refreshes: the configured interval scaled by
    /// `min(2^consecutive_failures, cap)`
    ///
    /// Returns None for manual-only bindings.
    pub fn effective_wait(&self, backoff_cap: u32) -> Option<Duration> {
        let interval = self.refresh_interval?;
        let factor = 2u32
            .checked_pow(self.consecutive_failures)
            .unwrap_or(backoff_cap)
            .min(backoff_cap.max(1));
        Some(interval * factor)
    }

    /// Whether a scheduled refresh should run at `now`
    pub fn is_due(&self, now: Instant, backoff_cap: u32) -> bool {
        if self.role != BindingRole::Replica || self.state != BindingState::Available {
            return false;
        }
        let Some(wait) = self.effective_wait(backoff_cap) else {
            return false;
        };
        match self.last_refresh_ended_at {
            None => true,
            Some(ended) => now.saturating_duration_since(ended) >= wait,
        }
    }
}
