mod config;

use common::domain::{InMemoryAuxReadingRepository, InMemoryTorqueEventRepository};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use config::ServiceConfig;
use std::sync::Arc;
use torque_ingest::{TorqueIngest, TorqueIngestConfig};
use torque_runner::Runner;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    // Initialize configuration and tracing
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry (tracing + OpenTelemetry for traces and logs)
    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        mqtt_enabled = config.mqtt_enabled,
        "Starting torque-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    // In-memory storage; database-backed repositories plug in through the same traits
    let event_repository = Arc::new(InMemoryTorqueEventRepository::new());
    let aux_repository = Arc::new(InMemoryAuxReadingRepository::new());

    let torque_ingest = match TorqueIngest::new(
        TorqueIngestConfig {
            mqtt: config.mqtt_subscriber_config(),
            persistence_workers: config.persistence_workers,
            persistence_queue_capacity: config.persistence_queue_capacity,
            packet_dump_dir: config.packet_dump_dir.clone(),
            replay_dir: config.replay_dir.clone(),
        },
        event_repository.clone(),
        aux_repository,
    )
    .await
    {
        Ok(ingest) => ingest,
        Err(e) => {
            error!("Failed to initialize torque ingest: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    // Build runner with all processes
    let mut runner = Runner::new();
    for (name, process) in torque_ingest.into_runner_processes() {
        runner = runner.with_boxed_process(name, process);
    }

    runner = runner
        .with_closer(move || shutdown(event_repository, telemetry_providers))
        .with_shutdown_grace(config.shutdown_timeout())
        .with_closer_timeout(config.shutdown_timeout());

    // Run the service
    if let Err(e) = runner.run().await {
        eprintln!("torque-all-in-one stopped with error: {:#}", e);
        std::process::exit(1);
    }
}

/// Closer run after every process has stopped
async fn shutdown(
    event_repository: Arc<InMemoryTorqueEventRepository>,
    telemetry_providers: Option<TelemetryProviders>,
) -> anyhow::Result<()> {
    info!("Running cleanup tasks...");
    let stored_events = event_repository.count().await;
    info!(stored_events, "torque events held in memory at shutdown");

    // Shutdown telemetry and flush pending traces and logs
    shutdown_telemetry(telemetry_providers);
    Ok(())
}
