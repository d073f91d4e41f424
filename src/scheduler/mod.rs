//! Refresh scheduling
//!
//! A single fixed-tick loop drives the whole fleet. Each tick asks the
//! registry which bindings are due and tries to claim each one with the
//! `Available → Refreshing` compare-and-swap; only winners reach the
//! executor. Losing the swap is normal when a manual refresh or another
//! scheduler got there first, and means skipping the binding this tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng as _;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::executor::RefreshExecutor;
use crate::registry::{BindingId, BindingRegistry, BindingState, RegistryError};

pub struct RefreshScheduler {
    registry: Arc<BindingRegistry>,
    executor: Arc<RefreshExecutor>,
    config: SchedulerConfig,
}

impl RefreshScheduler {
    pub fn new(
        registry: Arc<BindingRegistry>,
        executor: Arc<RefreshExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            executor,
            config,
        }
    }

    /// Start the tick loop
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let tick_interval = self.config.tick_interval();
        info!(
            tick_secs = tick_interval.as_secs(),
            backoff_cap = self.config.backoff_cap_multiplier,
            "Refresh scheduler started"
        );

        tokio::spawn(async move {
            // Random initial delay to stagger ticks across restarts
            let stagger_ms =
                rand::thread_rng().gen_range(0..tick_interval.as_millis().max(1) as u64);
            tokio::time::sleep(Duration::from_millis(stagger_ms)).await;

            let mut ticker = tokio::time::interval(tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Refresh scheduler shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.tick(Instant::now());
                    }
                }
            }
        })
    }

    /// One scheduling pass; returns how many refreshes were dispatched
    pub fn tick(&self, now: Instant) -> usize {
        crate::metrics::metrics().scheduler_tick();

        let due = self
            .registry
            .list_due(now, self.config.backoff_cap_multiplier);
        let mut dispatched = 0;
        for id in due {
            match self.request_refresh(&id) {
                Ok(()) => dispatched += 1,
                Err(RegistryError::StaleTransition { current, .. }) => {
                    // Lost the claim to a manual refresh or state change
                    crate::metrics::metrics().record_claim_lost();
                    debug!(binding = %id, current = ?current, "Skipping binding this tick");
                }
                Err(e) => {
                    warn!(binding = %id, error = %e, "Failed to claim due binding");
                }
            }
        }
        if dispatched > 0 {
            debug!(dispatched = dispatched, "Scheduler tick dispatched refreshes");
            crate::metrics::metrics().record_dispatched(dispatched as u64);
        }
        dispatched
    }

    /// Claim a binding and hand it to the executor
    ///
    /// This is the single claim path: scheduled refreshes call it per due
    /// binding and manual refreshes call it directly, so the two can never
    /// start a second attempt on a binding that is already refreshing.
    pub fn request_refresh(&self, id: &BindingId) -> Result<(), RegistryError> {
        self.registry
            .transition(id, BindingState::Available, BindingState::Refreshing)?;
        self.executor.dispatch(id.clone());
        Ok(())
    }
}
