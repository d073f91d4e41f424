//! Bounded history of completed refresh attempts
//!
//! Dashboards read recent attempts from here; the ring evicts the oldest
//! entry on overflow so memory stays bounded regardless of fleet size.

use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::Mutex;

use super::binding::BindingId;

/// Terminal outcome of a refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Success,
    Failed,
    Cancelled,
}

impl RefreshOutcome {
    /// Label used for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshOutcome::Success => "success",
            RefreshOutcome::Failed => "failed",
            RefreshOutcome::Cancelled => "cancelled",
        }
    }
}

/// Record of one executed refresh attempt
#[derive(Debug, Clone)]
pub struct RefreshOperation {
    pub binding_id: BindingId,
    pub started_at: Instant,
    pub ended_at: Instant,
    pub bytes_transferred: u64,
    pub outcome: RefreshOutcome,
}

/// Ring buffer of completed refresh operations
pub struct RefreshHistory {
    ring: Mutex<VecDeque<RefreshOperation>>,
    capacity: usize,
}

impl RefreshHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Record a completed attempt, evicting the oldest entry when full
    pub fn record(&self, operation: RefreshOperation) {
        let mut ring = self.ring.lock();
        if ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(operation);
    }

    /// Most recent operations, newest first, at most `limit`
    pub fn recent(&self, limit: usize) -> Vec<RefreshOperation> {
        let ring = self.ring.lock();
        ring.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }
}
