use std::time::Duration;

use serde::Deserialize;

use crate::registry::{BindingId, BindingRole, ReplicaBinding};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Refresh scheduling
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Refresh execution (worker pool, timeouts)
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Health evaluation and alerting cadence
    #[serde(default)]
    pub health: HealthConfig,
    /// Refresh history ring
    #[serde(default)]
    pub history: HistoryConfig,
    /// Prometheus endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Transport provider tuning
    #[serde(default)]
    pub transport: TransportConfig,
    /// Declared primary→replica bindings
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

/// Refresh scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between due checks (seconds)
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Cap on the exponential backoff multiplier applied after failures
    #[serde(default = "default_backoff_cap_multiplier")]
    pub backoff_cap_multiplier: u32,
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_backoff_cap_multiplier() -> u32 {
    16
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            backoff_cap_multiplier: default_backoff_cap_multiplier(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

// ============================================================================
// Executor Configuration
// ============================================================================

/// Refresh executor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum refreshes in flight across all bindings
    #[serde(default = "default_max_concurrent_refreshes")]
    pub max_concurrent_refreshes: usize,
    /// Hard deadline for a single refresh attempt (seconds)
    #[serde(default = "default_refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
}

fn default_max_concurrent_refreshes() -> usize {
    8
}

fn default_refresh_timeout_secs() -> u64 {
    3600
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_refreshes: default_max_concurrent_refreshes(),
            refresh_timeout_secs: default_refresh_timeout_secs(),
        }
    }
}

impl ExecutorConfig {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs.max(1))
    }
}

// ============================================================================
// Health Configuration
// ============================================================================

/// Health evaluation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Interval between evaluation cycles (seconds)
    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,
    /// Age of the last successful refresh before data counts as stale (hours)
    #[serde(default = "default_stale_threshold_hours")]
    pub stale_threshold_hours: u64,
    /// Sanity timeout for a binding stuck in refresh (seconds)
    #[serde(default = "default_stuck_refresh_timeout_secs")]
    pub stuck_refresh_timeout_secs: u64,
}

fn default_evaluation_interval_secs() -> u64 {
    60
}

fn default_stale_threshold_hours() -> u64 {
    24
}

fn default_stuck_refresh_timeout_secs() -> u64 {
    7200
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: default_evaluation_interval_secs(),
            stale_threshold_hours: default_stale_threshold_hours(),
            stuck_refresh_timeout_secs: default_stuck_refresh_timeout_secs(),
        }
    }
}

impl HealthConfig {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs.max(1))
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_hours * 3600)
    }

    pub fn stuck_refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.stuck_refresh_timeout_secs.max(1))
    }
}

// ============================================================================
// History / Metrics / Transport Configuration
// ============================================================================

/// Refresh history ring configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Completed attempts retained for dashboards
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

fn default_history_capacity() -> usize {
    256
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

/// Prometheus endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen_addr() -> String {
    "127.0.0.1:9184".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

/// Transport provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Connection establishment timeout (seconds)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

// ============================================================================
// Binding Configuration
// ============================================================================

/// One declared primary→replica binding
#[derive(Debug, Clone, Deserialize)]
pub struct BindingConfig {
    /// Account locator of the primary
    pub primary_locator: String,
    /// Database being replicated
    pub database: String,
    /// Account locator hosting the replica
    pub secondary_locator: String,
    /// Binding role
    #[serde(default)]
    pub role: BindingRole,
    /// Source-dataset identifier handed to the transport; derived from the
    /// locator and database when omitted
    #[serde(default)]
    pub primary_ref: Option<String>,
    /// Scheduled refresh cadence; omitted means manual-only
    #[serde(default)]
    pub refresh_interval_minutes: Option<u64>,
}

impl BindingConfig {
    pub fn id(&self) -> BindingId {
        BindingId::new(
            self.primary_locator.clone(),
            self.database.clone(),
            self.secondary_locator.clone(),
        )
    }

    pub fn primary_ref(&self) -> String {
        self.primary_ref
            .clone()
            .unwrap_or_else(|| format!("{}/{}", self.primary_locator, self.database))
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_minutes
            .map(|minutes| Duration::from_secs(minutes * 60))
    }

    pub fn to_binding(&self) -> ReplicaBinding {
        ReplicaBinding::new(
            self.id(),
            self.role,
            self.primary_ref(),
            self.refresh_interval(),
        )
    }
}
