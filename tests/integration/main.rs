//! Integration test entry point
//!
//! Drives the full controller in-process against a programmable mock
//! transport and a collecting notification sink; no external services are
//! required.

mod failures;
mod scheduling;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use castor::alert::{AlertEvent, NotificationSink};
use castor::config::{BindingConfig, Config};
use castor::controller::Controller;
use castor::registry::{BindingId, BindingRole};
use castor::transport::{PullReport, Transport, TransportError};

/// Per-primary-ref behavior of the mock transport
#[derive(Debug, Clone)]
pub enum PullBehavior {
    Success { bytes: u64, delay: Duration },
    Fail { error: String },
    HangUntilCancelled,
}

/// Programmable transport for driving the controller in tests
pub struct MockTransport {
    behaviors: RwLock<HashMap<String, PullBehavior>>,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            behaviors: RwLock::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn set_behavior(&self, primary_ref: &str, behavior: PullBehavior) {
        self.behaviors
            .write()
            .insert(primary_ref.to_string(), behavior);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn pull(
        &self,
        primary_ref: &str,
        cancel: CancellationToken,
    ) -> Result<PullReport, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let behavior = self
            .behaviors
            .read()
            .get(primary_ref)
            .cloned()
            .unwrap_or(PullBehavior::Success {
                bytes: 1024,
                delay: Duration::from_millis(10),
            });

        let outcome = match behavior {
            PullBehavior::Success { bytes, delay } => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(TransportError::Cancelled),
                    _ = tokio::time::sleep(delay) => Ok(PullReport {
                        bytes_transferred: bytes,
                    }),
                }
            }
            PullBehavior::Fail { error } => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err(TransportError::Transfer(error))
            }
            PullBehavior::HangUntilCancelled => {
                cancel.cancelled().await;
                Err(TransportError::Cancelled)
            }
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// Sink that collects alert events for assertions
pub struct CollectingSink {
    events: Mutex<Vec<AlertEvent>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

impl NotificationSink for CollectingSink {
    fn notify(&self, event: &AlertEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Config tuned for fast tests: metrics disabled, short timeouts
pub fn test_config(bindings: Vec<BindingConfig>) -> Config {
    let mut config = Config::default();
    config.metrics.enabled = false;
    config.scheduler.tick_interval_secs = 1;
    config.health.evaluation_interval_secs = 1;
    config.executor.refresh_timeout_secs = 2;
    config.executor.max_concurrent_refreshes = 4;
    config.bindings = bindings;
    config
}

/// A replica binding config for `acct_a/<database>` replicated to `acct_b`
pub fn replica_binding(database: &str, interval_minutes: Option<u64>) -> BindingConfig {
    BindingConfig {
        primary_locator: "acct_a".to_string(),
        database: database.to_string(),
        secondary_locator: "acct_b".to_string(),
        role: BindingRole::Replica,
        primary_ref: None,
        refresh_interval_minutes: interval_minutes,
    }
}

pub fn binding_id(database: &str) -> BindingId {
    BindingId::new("acct_a", database, "acct_b")
}

/// Build an unstarted controller around the mock transport and sink
pub fn build_controller(
    config: &Config,
    transport: Arc<MockTransport>,
    sink: Arc<CollectingSink>,
) -> (Controller, CancellationToken) {
    let shutdown = CancellationToken::new();
    let controller = Controller::new(config, transport, sink, shutdown.clone())
        .expect("failed to build controller");
    (controller, shutdown)
}

/// Poll until `predicate` holds or the deadline passes
pub async fn wait_for(predicate: impl Fn() -> bool, deadline: Duration, what: &str) {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
