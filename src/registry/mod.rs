//! Replica binding registry
//!
//! Holds every configured primary→replica binding and is the only place
//! binding state is mutated. All state changes go through compare-and-swap
//! transitions under the binding's own lock, which is what makes the
//! at-most-one-refresh-in-flight guarantee hold without a global lock.

mod binding;
mod history;

pub use binding::{BindingId, BindingRole, BindingState, RefreshStatus, ReplicaBinding};
pub use history::{RefreshHistory, RefreshOperation, RefreshOutcome};

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("binding already registered: {0}")]
    DuplicateBinding(BindingId),

    #[error("binding not found: {0}")]
    NotFound(BindingId),

    /// Compare-and-swap conflict; the caller lost the race and should
    /// re-read before deciding whether to retry
    #[error("stale transition for {id}: expected {expected:?}, current {current:?}")]
    StaleTransition {
        id: BindingId,
        expected: BindingState,
        current: BindingState,
    },
}

/// Result of a refresh attempt, applied atomically by `finish_refresh`
#[derive(Debug, Clone)]
pub enum RefreshResult {
    Success { bytes_transferred: u64 },
    Failure { error: String },
    Cancelled,
}

impl RefreshResult {
    pub fn outcome(&self) -> RefreshOutcome {
        match self {
            RefreshResult::Success { .. } => RefreshOutcome::Success,
            RefreshResult::Failure { .. } => RefreshOutcome::Failed,
            RefreshResult::Cancelled => RefreshOutcome::Cancelled,
        }
    }
}

/// Per-state binding counts
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    pub total: usize,
    pub provisioning: usize,
    pub available: usize,
    pub refreshing: usize,
    pub unavailable: usize,
}

/// Registry of replica bindings keyed by `BindingId`
///
/// Each binding sits behind its own `RwLock` inside a `DashMap`, so bindings
/// never contend with each other and a transition on one binding is atomic
/// with respect to concurrent schedulers and executors.
pub struct BindingRegistry {
    bindings: DashMap<BindingId, Arc<RwLock<ReplicaBinding>>>,
}

impl Default for BindingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }

    /// Register a new binding
    pub fn register(&self, binding: ReplicaBinding) -> Result<(), RegistryError> {
        let id = binding.id.clone();
        match self.bindings.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(RegistryError::DuplicateBinding(id))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                info!(binding = %id, role = ?binding.role, "Registered binding");
                entry.insert(Arc::new(RwLock::new(binding)));
                Ok(())
            }
        }
    }

    /// Point-in-time copy of a binding's state
    pub fn snapshot(&self, id: &BindingId) -> Result<ReplicaBinding, RegistryError> {
        self.bindings
            .get(id)
            .map(|entry| entry.read().clone())
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Point-in-time copies of every binding
    pub fn snapshots(&self) -> Vec<ReplicaBinding> {
        self.bindings
            .iter()
            .map(|entry| entry.value().read().clone())
            .collect()
    }

    /// Compare-and-swap state transition
    ///
    /// Fails with `StaleTransition` when the current state is not `from`.
    /// Entering `Refreshing` stamps `last_refresh_started_at`.
    pub fn transition(
        &self,
        id: &BindingId,
        from: BindingState,
        to: BindingState,
    ) -> Result<(), RegistryError> {
        let entry = self
            .bindings
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        let mut binding = entry.write();
        if binding.state != from {
            return Err(RegistryError::StaleTransition {
                id: id.clone(),
                expected: from,
                current: binding.state,
            });
        }

        binding.state = to;
        if to == BindingState::Refreshing {
            binding.last_refresh_started_at = Some(Instant::now());
        }
        debug!(binding = %id, from = ?from, to = ?to, "Binding transitioned");
        Ok(())
    }

    /// Terminal transition for a refresh attempt
    ///
    /// Atomically moves the binding `Refreshing → Available` and applies the
    /// outcome fields in the same critical section, so readers never observe
    /// a half-applied result. Exactly one of success, failure, or
    /// cancellation is applied per attempt.
    pub fn finish_refresh(
        &self,
        id: &BindingId,
        result: &RefreshResult,
    ) -> Result<(), RegistryError> {
        let entry = self
            .bindings
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        let mut binding = entry.write();
        if binding.state != BindingState::Refreshing {
            return Err(RegistryError::StaleTransition {
                id: id.clone(),
                expected: BindingState::Refreshing,
                current: binding.state,
            });
        }

        let ended = Instant::now();
        binding.state = BindingState::Available;
        binding.last_refresh_ended_at = Some(ended);
        match result {
            RefreshResult::Success { bytes_transferred } => {
                binding.last_refresh_status = RefreshStatus::Success;
                binding.last_success_at = Some(ended);
                binding.consecutive_failures = 0;
                binding.last_error = None;
                info!(
                    binding = %id,
                    bytes = bytes_transferred,
                    "Refresh succeeded"
                );
            }
            RefreshResult::Failure { error } => {
                binding.last_refresh_status = RefreshStatus::Failed;
                binding.consecutive_failures += 1;
                binding.last_error = Some(error.clone());
                info!(
                    binding = %id,
                    error = %error,
                    consecutive_failures = binding.consecutive_failures,
                    "Refresh failed"
                );
            }
            RefreshResult::Cancelled => {
                binding.last_refresh_status = RefreshStatus::Failed;
                binding.last_error = Some("cancelled".to_string());
                info!(binding = %id, "Refresh cancelled");
            }
        }
        Ok(())
    }

    /// Bindings whose scheduled refresh should run at `now`
    ///
    /// Never returns a binding that is currently `Refreshing`: the due check
    /// requires `Available`, and a binding only leaves `Refreshing` through
    /// `finish_refresh`.
    pub fn list_due(&self, now: Instant, backoff_cap: u32) -> Vec<BindingId> {
        self.bindings
            .iter()
            .filter(|entry| entry.value().read().is_due(now, backoff_cap))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Per-state counts for gauges and operator summaries
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.bindings.len(),
            ..Default::default()
        };
        for entry in self.bindings.iter() {
            match entry.value().read().state {
                BindingState::Provisioning => stats.provisioning += 1,
                BindingState::Available => stats.available += 1,
                BindingState::Refreshing => stats.refreshing += 1,
                BindingState::Unavailable => stats.unavailable += 1,
            }
        }
        stats
    }
}
