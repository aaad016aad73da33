//! crashdumpd - CPU crash-dump collection daemon
//!
//! Discovers the processors on the sideband bus, collects crash dumps when
//! triggered and keeps them in the output directory.

use anyhow::{Context, Result};
use crashdump_lib::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    BusTransport, CollectorBuilder, ScriptedBus,
};
use crashdumpd::{api, config::DaemonConfig, service::CrashdumpService};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

fn open_bus(config: &DaemonConfig) -> Result<Arc<dyn BusTransport>> {
    match &config.bus_fixture {
        Some(path) => {
            let bus = ScriptedBus::from_fixture(path)
                .with_context(|| format!("failed to load bus fixture {}", path.display()))?;
            info!(fixture = %path.display(), "Using scripted bus");
            Ok(Arc::new(bus))
        }
        None => {
            warn!("No bus fixture configured, no processors will answer");
            Ok(Arc::new(ScriptedBus::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting crashdumpd");

    let config = DaemonConfig::load()?;
    info!(
        platform = %config.platform_name,
        output_dir = %config.output_dir.display(),
        "Daemon configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let bus = open_bus(&config)?;
    let collector = CollectorBuilder::new()
        .bus(bus)
        .input_paths(config.input_paths())
        .platform_name(config.platform_name.clone())
        .crashdump_version(DAEMON_VERSION)
        .build()?;
    let service = CrashdumpService::new(collector, config.log_store());
    let logger = StructuredLogger::new(config.platform_name.clone());

    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        warn!(error = %e, "Output directory is not writable");
        health_registry
            .set_unhealthy(components::LOG_STORE, e.to_string())
            .await;
    }

    let mut cpus = 0;
    if config.startup_discovery {
        cpus = service.discover().await?;
        if cpus == 0 {
            health_registry
                .set_degraded(components::TOPOLOGY, "No processors identified")
                .await;
        }
    }
    logger.log_startup(DAEMON_VERSION, cpus);

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), service));

    // Mark daemon as ready after initialization
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Err(e)) => error!(error = %e, "API server stopped"),
                Err(e) => error!(error = %e, "API server task failed"),
                Ok(Ok(())) => {}
            }
            logger.log_shutdown("API server stopped");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }
    info!("Shutting down");

    Ok(())
}
