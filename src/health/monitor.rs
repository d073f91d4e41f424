//! Background health evaluation loop
//!
//! Runs on its own low-frequency timer, reads registry snapshots only, and
//! never blocks scheduling. Also the home of the stuck-refresh watchdog: a
//! binding sitting in `Refreshing` past the sanity timeout indicates a lost
//! executor task and is surfaced as a critical operational alert.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::alert::AlertDispatcher;
use crate::config::HealthConfig;
use crate::registry::{BindingId, BindingRegistry, BindingState};

use super::evaluator::{classify, HealthPolicy};

pub struct HealthMonitor {
    registry: Arc<BindingRegistry>,
    dispatcher: Arc<AlertDispatcher>,
    policy: HealthPolicy,
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<BindingRegistry>,
        dispatcher: Arc<AlertDispatcher>,
        config: HealthConfig,
    ) -> Self {
        let policy = HealthPolicy::from(&config);
        Self {
            registry,
            dispatcher,
            policy,
            config,
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// Start the evaluation loop
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let interval = self.config.evaluation_interval();
        info!(interval_secs = interval.as_secs(), "Health monitor started");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Health monitor shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.evaluate(Instant::now());
                    }
                }
            }
        })
    }

    /// One evaluation cycle: classify every binding, feed the dispatcher,
    /// run the stuck watchdog, refresh the gauges
    pub fn evaluate(&self, now: Instant) {
        let snapshots = self.registry.snapshots();
        let mut healthy = 0i64;
        let mut attention = 0i64;

        for binding in &snapshots {
            if binding.state == BindingState::Refreshing {
                if let Some(started) = binding.last_refresh_started_at {
                    let running_for = now.saturating_duration_since(started);
                    if running_for > self.config.stuck_refresh_timeout() {
                        error!(
                            binding = %binding.id,
                            running_secs = running_for.as_secs(),
                            "Refresh stuck past sanity timeout"
                        );
                        self.dispatcher.mark_stuck(&binding.id, running_for);
                    }
                }
            } else {
                self.dispatcher.clear_stuck(&binding.id);
            }

            let health = classify(binding, now, &self.policy);
            if health.needs_attention() {
                attention += 1;
            } else {
                healthy += 1;
            }
            crate::metrics::metrics().observe_health(health.as_str());
            self.dispatcher.observe(&binding.id, health);
        }

        let stats = self.registry.stats();
        crate::metrics::metrics().set_binding_states(&stats);
        debug!(
            total = snapshots.len(),
            healthy = healthy,
            needs_attention = attention,
            refreshing = stats.refreshing,
            "Health evaluation cycle"
        );
    }

    /// Bindings whose current classification needs operator attention
    pub fn unhealthy(&self, now: Instant) -> Vec<BindingId> {
        self.registry
            .snapshots()
            .iter()
            .filter(|binding| classify(binding, now, &self.policy).needs_attention())
            .map(|binding| binding.id.clone())
            .collect()
    }
}
