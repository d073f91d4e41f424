//! Edge-triggered alerting
//!
//! The dispatcher remembers the last classification it emitted per binding
//! and only notifies the sink on change, so a replica that stays stale for
//! a week produces one alert, not one per evaluation cycle.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use tracing::{error, info, warn};

use crate::health::Health;
use crate::registry::BindingId;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Severity of a health classification
    pub fn of(health: Health) -> Self {
        match health {
            Health::NeverRefreshed | Health::Unknown | Health::Unavailable => Severity::Critical,
            Health::StaleData | Health::RefreshOverdue => Severity::Warning,
            Health::Healthy | Health::Primary => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// What the alert is about
#[derive(Debug, Clone)]
pub enum AlertKind {
    /// Health classification changed; `from` is None on first observation
    HealthChanged { from: Option<Health>, to: Health },
    /// A refresh has been in flight past the sanity timeout
    RefreshStuck { running_for: Duration },
}

/// One alert, delivered to the notification sink
#[derive(Debug, Clone)]
pub struct AlertEvent {
    pub binding_id: BindingId,
    pub kind: AlertKind,
    pub severity: Severity,
    pub raised_at: SystemTime,
}

/// Delivery boundary; email/webhook/pager integrations implement this
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &AlertEvent);
}

/// Sink that writes alerts to the log
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, event: &AlertEvent) {
        match event.severity {
            Severity::Critical => error!(
                binding = %event.binding_id,
                kind = ?event.kind,
                "ALERT"
            ),
            Severity::Warning => warn!(
                binding = %event.binding_id,
                kind = ?event.kind,
                "ALERT"
            ),
            Severity::Info => info!(
                binding = %event.binding_id,
                kind = ?event.kind,
                "Alert resolved"
            ),
        }
    }
}

/// Edge-triggered alert dispatcher
pub struct AlertDispatcher {
    /// Last emitted classification per binding
    last_seen: DashMap<BindingId, Health>,
    /// Bindings with an outstanding stuck-refresh alert
    stuck: DashMap<BindingId, ()>,
    sink: Arc<dyn NotificationSink>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            last_seen: DashMap::new(),
            stuck: DashMap::new(),
            sink,
        }
    }

    /// Feed one classification; emits iff it differs from the previous one.
    ///
    /// The first observation of a binding emits only when its severity is
    /// above Info, so a healthy fleet starts up silently while a broken
    /// binding alerts immediately. Returns whether an event was emitted.
    pub fn observe(&self, id: &BindingId, health: Health) -> bool {
        let previous = self.last_seen.insert(id.clone(), health);
        match previous {
            Some(prev) if prev == health => false,
            Some(prev) => {
                self.emit(AlertEvent {
                    binding_id: id.clone(),
                    kind: AlertKind::HealthChanged {
                        from: Some(prev),
                        to: health,
                    },
                    severity: Severity::of(health),
                    raised_at: SystemTime::now(),
                });
                true
            }
            None if Severity::of(health) > Severity::Info => {
                self.emit(AlertEvent {
                    binding_id: id.clone(),
                    kind: AlertKind::HealthChanged {
                        from: None,
                        to: health,
                    },
                    severity: Severity::of(health),
                    raised_at: SystemTime::now(),
                });
                true
            }
            None => false,
        }
    }

    /// Raise the stuck-refresh alert once per stuck episode
    pub fn mark_stuck(&self, id: &BindingId, running_for: Duration) -> bool {
        if self.stuck.insert(id.clone(), ()).is_some() {
            return false;
        }
        self.emit(AlertEvent {
            binding_id: id.clone(),
            kind: AlertKind::RefreshStuck { running_for },
            severity: Severity::Critical,
            raised_at: SystemTime::now(),
        });
        true
    }

    /// Re-arm the stuck alert once the binding leaves `Refreshing`
    pub fn clear_stuck(&self, id: &BindingId) {
        self.stuck.remove(id);
    }

    fn emit(&self, event: AlertEvent) {
        crate::metrics::metrics().record_alert(event.severity.as_str());
        self.sink.notify(&event);
    }
}
