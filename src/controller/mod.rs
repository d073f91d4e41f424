//! Controller facade
//!
//! Wires the registry, scheduler, executor, health monitor, and alert
//! dispatcher together and exposes the surface an operator-facing tool or
//! CLI calls. Every state change offered here goes through the registry's
//! compare-and-swap transitions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::alert::{AlertDispatcher, NotificationSink};
use crate::config::Config;
use crate::executor::RefreshExecutor;
use crate::health::{classify, Health, HealthMonitor};
use crate::registry::{
    BindingId, BindingRegistry, BindingRole, BindingState, RefreshHistory, RefreshOperation,
    RefreshStatus, RegistryError, ReplicaBinding,
};
use crate::scheduler::RefreshScheduler;
use crate::transport::Transport;

/// Operator-facing view of one binding
#[derive(Debug, Clone)]
pub struct BindingStatus {
    pub state: BindingState,
    pub last_refresh_status: RefreshStatus,
    pub health: Health,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

pub struct Controller {
    registry: Arc<BindingRegistry>,
    history: Arc<RefreshHistory>,
    executor: Arc<RefreshExecutor>,
    scheduler: Arc<RefreshScheduler>,
    monitor: Arc<HealthMonitor>,
    shutdown: CancellationToken,
}

impl Controller {
    /// Build a controller from configuration
    ///
    /// Config-declared bindings are registered and activated; a duplicate
    /// binding in the file is a hard error.
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn NotificationSink>,
        shutdown: CancellationToken,
    ) -> Result<Self, RegistryError> {
        let registry = Arc::new(BindingRegistry::new());
        for binding_config in &config.bindings {
            registry.register(binding_config.to_binding())?;
            registry.transition(
                &binding_config.id(),
                BindingState::Provisioning,
                BindingState::Available,
            )?;
        }
        info!(bindings = registry.len(), "Controller configured");

        let history = Arc::new(RefreshHistory::new(config.history.capacity));
        let executor = Arc::new(RefreshExecutor::new(
            registry.clone(),
            transport,
            history.clone(),
            &config.executor,
            shutdown.clone(),
        ));
        let scheduler = Arc::new(RefreshScheduler::new(
            registry.clone(),
            executor.clone(),
            config.scheduler.clone(),
        ));
        let dispatcher = Arc::new(AlertDispatcher::new(sink));
        let monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            dispatcher,
            config.health.clone(),
        ));

        Ok(Self {
            registry,
            history,
            executor,
            scheduler,
            monitor,
            shutdown,
        })
    }

    /// Start the scheduler and health monitor loops
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.scheduler.clone().start(self.shutdown.clone()),
            self.monitor.clone().start(self.shutdown.clone()),
        ]
    }

    /// Register a new binding; it starts in `Provisioning` and joins
    /// scheduling after `activate`
    pub fn create_binding(
        &self,
        primary_locator: &str,
        database: &str,
        secondary_locator: &str,
        role: BindingRole,
        refresh_interval: Option<Duration>,
    ) -> Result<BindingId, RegistryError> {
        let id = BindingId::new(primary_locator, database, secondary_locator);
        let primary_ref = format!("{primary_locator}/{database}");
        self.registry.register(ReplicaBinding::new(
            id.clone(),
            role,
            primary_ref,
            refresh_interval,
        ))?;
        Ok(id)
    }

    /// Mark a provisioned replica ready for scheduling
    pub fn activate(&self, id: &BindingId) -> Result<(), RegistryError> {
        self.registry
            .transition(id, BindingState::Provisioning, BindingState::Available)
    }

    /// Take a binding out of service
    pub fn disable(&self, id: &BindingId) -> Result<(), RegistryError> {
        self.registry
            .transition(id, BindingState::Available, BindingState::Unavailable)
    }

    /// Return a disabled binding to service
    pub fn enable(&self, id: &BindingId) -> Result<(), RegistryError> {
        self.registry
            .transition(id, BindingState::Unavailable, BindingState::Available)
    }

    /// Trigger a refresh immediately
    ///
    /// Uses the same claim path as the scheduler, so a manual refresh can
    /// never race a scheduled one; fails with `StaleTransition` when an
    /// attempt is already in flight.
    pub fn refresh_now(&self, id: &BindingId) -> Result<(), RegistryError> {
        self.scheduler.request_refresh(id)
    }

    /// Cancel an in-flight refresh; returns whether one existed
    pub fn cancel_refresh(&self, id: &BindingId) -> bool {
        self.executor.cancel(id)
    }

    /// Current state plus health classification for one binding
    pub fn get_status(&self, id: &BindingId) -> Result<BindingStatus, RegistryError> {
        let snapshot = self.registry.snapshot(id)?;
        let health = classify(&snapshot, Instant::now(), self.monitor.policy());
        Ok(BindingStatus {
            state: snapshot.state,
            last_refresh_status: snapshot.last_refresh_status,
            health,
            consecutive_failures: snapshot.consecutive_failures,
            last_error: snapshot.last_error,
        })
    }

    /// Bindings whose classification needs operator attention
    pub fn list_unhealthy(&self) -> Vec<BindingId> {
        self.monitor.unhealthy(Instant::now())
    }

    /// Most recent refresh attempts, newest first
    pub fn recent_operations(&self, limit: usize) -> Vec<RefreshOperation> {
        self.history.recent(limit)
    }

    pub fn registry(&self) -> Arc<BindingRegistry> {
        self.registry.clone()
    }
}
