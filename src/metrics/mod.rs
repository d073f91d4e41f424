//! Prometheus metrics for the replication controller
//!
//! Exposes metrics via HTTP endpoint for Prometheus scraping.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::OnceLock;

use crate::registry::RegistryStats;

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Controller metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    // Refresh metrics
    /// Refresh attempts started
    pub refreshes_started_total: IntCounter,
    /// Refresh attempts finished, by outcome
    pub refreshes_total: IntCounterVec,
    /// Refresh duration histogram (seconds), by outcome
    pub refresh_duration_seconds: HistogramVec,
    /// Bytes pulled from primaries
    pub refresh_bytes_total: IntCounter,
    /// Attempts currently dispatched
    pub refreshes_inflight: IntGauge,

    // Scheduler metrics
    /// Scheduling passes
    pub scheduler_ticks_total: IntCounter,
    /// Refreshes dispatched by the scheduler
    pub scheduler_dispatched_total: IntCounter,
    /// Claims lost to a concurrent refresh
    pub claims_lost_total: IntCounter,

    // Health / alerting metrics
    /// Health evaluations, by classification
    pub health_evaluations_total: IntCounterVec,
    /// Current bindings by lifecycle state
    pub bindings: IntGaugeVec,
    /// Alerts emitted, by severity
    pub alerts_total: IntCounterVec,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let registry = Registry::new();

        let refreshes_started_total = IntCounter::new(
            "castor_refreshes_started_total",
            "Total number of refresh attempts started",
        )
        .unwrap();

        let refreshes_total = IntCounterVec::new(
            Opts::new(
                "castor_refreshes_total",
                "Total number of refresh attempts finished",
            ),
            &["outcome"], // success, failed, cancelled
        )
        .unwrap();

        let refresh_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "castor_refresh_duration_seconds",
                "Refresh attempt duration in seconds",
            )
            .buckets(vec![
                0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0, 3600.0,
            ]),
            &["outcome"],
        )
        .unwrap();

        let refresh_bytes_total = IntCounter::new(
            "castor_refresh_bytes_total",
            "Total bytes transferred from primaries",
        )
        .unwrap();

        let refreshes_inflight = IntGauge::new(
            "castor_refreshes_inflight",
            "Refresh attempts currently dispatched",
        )
        .unwrap();

        let scheduler_ticks_total = IntCounter::new(
            "castor_scheduler_ticks_total",
            "Total number of scheduling passes",
        )
        .unwrap();

        let scheduler_dispatched_total = IntCounter::new(
            "castor_scheduler_dispatched_total",
            "Total refreshes dispatched by the scheduler",
        )
        .unwrap();

        let claims_lost_total = IntCounter::new(
            "castor_claims_lost_total",
            "Refresh claims lost to a concurrent attempt",
        )
        .unwrap();

        let health_evaluations_total = IntCounterVec::new(
            Opts::new(
                "castor_health_evaluations_total",
                "Health evaluations by classification",
            ),
            &["classification"],
        )
        .unwrap();

        let bindings = IntGaugeVec::new(
            Opts::new("castor_bindings", "Current bindings by lifecycle state"),
            &["state"], // provisioning, available, refreshing, unavailable
        )
        .unwrap();

        let alerts_total = IntCounterVec::new(
            Opts::new("castor_alerts_total", "Alerts emitted by severity"),
            &["severity"], // info, warning, critical
        )
        .unwrap();

        // Register all metrics
        registry
            .register(Box::new(refreshes_started_total.clone()))
            .unwrap();
        registry.register(Box::new(refreshes_total.clone())).unwrap();
        registry
            .register(Box::new(refresh_duration_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(refresh_bytes_total.clone()))
            .unwrap();
        registry
            .register(Box::new(refreshes_inflight.clone()))
            .unwrap();
        registry
            .register(Box::new(scheduler_ticks_total.clone()))
            .unwrap();
        registry
            .register(Box::new(scheduler_dispatched_total.clone()))
            .unwrap();
        registry
            .register(Box::new(claims_lost_total.clone()))
            .unwrap();
        registry
            .register(Box::new(health_evaluations_total.clone()))
            .unwrap();
        registry.register(Box::new(bindings.clone())).unwrap();
        registry.register(Box::new(alerts_total.clone())).unwrap();

        Self {
            registry,
            refreshes_started_total,
            refreshes_total,
            refresh_duration_seconds,
            refresh_bytes_total,
            refreshes_inflight,
            scheduler_ticks_total,
            scheduler_dispatched_total,
            claims_lost_total,
            health_evaluations_total,
            bindings,
            alerts_total,
        }
    }

    /// Record a refresh attempt being dispatched
    pub fn refresh_started(&self) {
        self.refreshes_started_total.inc();
        self.refreshes_inflight.inc();
    }

    /// Record a finished refresh attempt
    pub fn refresh_finished(&self, outcome: &str, duration_secs: f64, bytes: u64) {
        self.refreshes_inflight.dec();
        self.refreshes_total.with_label_values(&[outcome]).inc();
        self.refresh_duration_seconds
            .with_label_values(&[outcome])
            .observe(duration_secs);
        self.refresh_bytes_total.inc_by(bytes);
    }

    /// Record a scheduling pass
    pub fn scheduler_tick(&self) {
        self.scheduler_ticks_total.inc();
    }

    /// Record refreshes dispatched in one pass
    pub fn record_dispatched(&self, count: u64) {
        self.scheduler_dispatched_total.inc_by(count);
    }

    /// Record a claim lost to a concurrent attempt
    pub fn record_claim_lost(&self) {
        self.claims_lost_total.inc();
    }

    /// Record one health evaluation
    pub fn observe_health(&self, classification: &str) {
        self.health_evaluations_total
            .with_label_values(&[classification])
            .inc();
    }

    /// Record an emitted alert
    pub fn record_alert(&self, severity: &str) {
        self.alerts_total.with_label_values(&[severity]).inc();
    }

    /// Update per-state binding gauges
    pub fn set_binding_states(&self, stats: &RegistryStats) {
        self.bindings
            .with_label_values(&["provisioning"])
            .set(stats.provisioning as i64);
        self.bindings
            .with_label_values(&["available"])
            .set(stats.available as i64);
        self.bindings
            .with_label_values(&["refreshing"])
            .set(stats.refreshing as i64);
        self.bindings
            .with_label_values(&["unavailable"])
            .set(stats.unavailable as i64);
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(addr: &str) -> anyhow::Result<()> {
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tracing::{error, info};

    async fn handle_request(
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        match req.uri().path() {
            "/metrics" => {
                let body = metrics().gather();
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                    .body(Full::new(Bytes::from(body)))
                    .unwrap())
            }
            "/health" => Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Full::new(Bytes::from("OK")))
                .unwrap()),
            _ => Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Full::new(Bytes::from("Not Found")))
                .unwrap()),
        }
    }

    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics server listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!(error = %e, "Metrics server connection error");
            }
        });
    }
}
