//! Refresh execution
//!
//! One tokio task per refresh attempt, bounded by a worker-pool semaphore so
//! a large fleet cannot open unbounded concurrent transfers. The executor is
//! handed a binding only after the caller won the `Available → Refreshing`
//! compare-and-swap; its contract is that every attempt applies exactly one
//! terminal outcome and the binding always leaves `Refreshing`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::ExecutorConfig;
use crate::registry::{
    BindingId, BindingRegistry, RefreshHistory, RefreshOperation, RefreshResult,
};
use crate::transport::{Transport, TransportError};

pub struct RefreshExecutor {
    registry: Arc<BindingRegistry>,
    transport: Arc<dyn Transport>,
    history: Arc<RefreshHistory>,
    permits: Arc<Semaphore>,
    inflight: Arc<DashMap<BindingId, CancellationToken>>,
    refresh_timeout: Duration,
    shutdown: CancellationToken,
}

impl RefreshExecutor {
    pub fn new(
        registry: Arc<BindingRegistry>,
        transport: Arc<dyn Transport>,
        history: Arc<RefreshHistory>,
        config: &ExecutorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            transport,
            history,
            permits: Arc::new(Semaphore::new(config.max_concurrent_refreshes.max(1))),
            inflight: Arc::new(DashMap::new()),
            refresh_timeout: config.refresh_timeout(),
            shutdown,
        }
    }

    /// Run one refresh attempt on its own task
    ///
    /// The caller must already hold the `Refreshing` claim for this binding.
    pub fn dispatch(&self, id: BindingId) {
        let registry = self.registry.clone();
        let transport = self.transport.clone();
        let history = self.history.clone();
        let permits = self.permits.clone();
        let inflight = self.inflight.clone();
        let refresh_timeout = self.refresh_timeout;

        let cancel = self.shutdown.child_token();
        inflight.insert(id.clone(), cancel.clone());
        crate::metrics::metrics().refresh_started();

        tokio::spawn(async move {
            // Waiting for a worker slot also races cancellation, so shutdown
            // never strands a queued attempt in Refreshing
            let permit = tokio::select! {
                _ = cancel.cancelled() => None,
                acquired = permits.acquire_owned() => acquired.ok(),
            };

            let started = Instant::now();
            let result = match permit {
                None => RefreshResult::Cancelled,
                Some(_permit) => {
                    Self::attempt(&registry, transport.as_ref(), &id, &cancel, refresh_timeout)
                        .await
                }
            };

            let bytes_transferred = match &result {
                RefreshResult::Success { bytes_transferred } => *bytes_transferred,
                _ => 0,
            };
            let ended = Instant::now();

            if let Err(e) = registry.finish_refresh(&id, &result) {
                // Can only happen if something else moved the binding out of
                // Refreshing, which violates the single-writer contract
                error!(binding = %id, error = %e, "Failed to record refresh outcome");
            }
            history.record(RefreshOperation {
                binding_id: id.clone(),
                started_at: started,
                ended_at: ended,
                bytes_transferred,
                outcome: result.outcome(),
            });
            crate::metrics::metrics().refresh_finished(
                result.outcome().as_str(),
                ended.saturating_duration_since(started).as_secs_f64(),
                bytes_transferred,
            );
            inflight.remove(&id);
        });
    }

    async fn attempt(
        registry: &BindingRegistry,
        transport: &dyn Transport,
        id: &BindingId,
        cancel: &CancellationToken,
        refresh_timeout: Duration,
    ) -> RefreshResult {
        let snapshot = match registry.snapshot(id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(binding = %id, error = %e, "Binding disappeared before refresh");
                return RefreshResult::Cancelled;
            }
        };

        debug!(binding = %id, primary_ref = %snapshot.primary_ref, "Refresh started");
        tokio::select! {
            _ = cancel.cancelled() => RefreshResult::Cancelled,
            pulled = tokio::time::timeout(
                refresh_timeout,
                transport.pull(&snapshot.primary_ref, cancel.clone()),
            ) => match pulled {
                Ok(Ok(report)) => RefreshResult::Success {
                    bytes_transferred: report.bytes_transferred,
                },
                Ok(Err(TransportError::Cancelled)) => RefreshResult::Cancelled,
                Ok(Err(e)) => RefreshResult::Failure {
                    error: e.to_string(),
                },
                Err(_) => RefreshResult::Failure {
                    error: format!(
                        "refresh timed out after {}s",
                        refresh_timeout.as_secs()
                    ),
                },
            }
        }
    }

    /// Cancel an in-flight refresh; returns whether one existed
    pub fn cancel(&self, id: &BindingId) -> bool {
        match self.inflight.get(id) {
            Some(entry) => {
                entry.value().cancel();
                true
            }
            None => false,
        }
    }

    /// Number of attempts currently dispatched (running or queued for a slot)
    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}
