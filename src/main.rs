//! DB Sync Server - Main entry point.

use db_sync_server::config::Config;
use db_sync_server::db::DriverRegistry;
use db_sync_server::sync::Orchestrator;
use db_sync_server::transport::{AppState, HttpTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);

    let settings = config.sync_settings();
    if let Err(e) = settings.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let registry = Arc::new(DriverRegistry::with_defaults());
    let local = config.local_endpoint();

    info!(
        local = %local.endpoint_label(),
        engines = ?registry.supported_engines(),
        batch_size = settings.batch_size,
        max_concurrent_tables = settings.max_concurrent_tables,
        "Starting DB Sync Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let orchestrator = Arc::new(Orchestrator::new(registry, settings, local));
    let state = AppState::new(orchestrator, config.default_endpoint());
    let transport = HttpTransport::new(state, &config.http_host, config.http_port);

    info!(transport = transport.name(), "Using {} transport", transport.name());
    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
