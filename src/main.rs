use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use castor::alert::LogSink;
use castor::config::Config;
use castor::controller::Controller;
use castor::transport::HttpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = load_or_default_config();

    let shutdown = CancellationToken::new();
    let transport = Arc::new(HttpTransport::new(&config.transport)?);
    let controller = Controller::new(&config, transport, Arc::new(LogSink), shutdown.clone())?;

    // Metrics endpoint
    if config.metrics.enabled {
        let addr = config.metrics.listen_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = castor::metrics::start_metrics_server(&addr).await {
                error!(error = %e, "Metrics server failed");
            }
        });
    }

    let handles = controller.start();
    info!(
        tick_secs = config.scheduler.tick_interval_secs,
        max_concurrent = config.executor.max_concurrent_refreshes,
        "Castor replication controller running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

fn load_or_default_config() -> Config {
    // Try to load from config file
    let config_paths = ["config/castor.toml", "castor.toml"];

    for path in config_paths {
        match Config::load(path) {
            Ok(config) => {
                info!(path = path, "Loaded configuration");
                return config;
            }
            Err(e) => {
                warn!(path = path, error = %e, "Failed to load config");
            }
        }
    }

    info!("Using default configuration");
    Config::default()
}
