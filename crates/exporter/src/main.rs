//! OOM Kill Exporter - container OOM-kill metrics daemon
//!
//! Consumes per-kill records from an external kernel-tracing engine and
//! exposes kill counters and last-kill gauges for Prometheus scraping.

use anyhow::Result;
use exporter_lib::{
    health::components, ExporterMetrics, HealthRegistry, MetricRegistry, Supervisor, TracerSource,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs with env-filter control
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = EXPORTER_VERSION, "starting oomkill-exporter");

    let config = config::ExporterConfig::load()?;
    info!(port = config.port, engine = %config.engine_path, "exporter configured");

    let health = HealthRegistry::new();
    health.register(components::SOURCE).await;
    health.register(components::SERVER).await;

    let metrics = ExporterMetrics::new();
    let registry = Arc::new(MetricRegistry::new());

    let source = Arc::new(TracerSource::new(
        config.engine_path.clone(),
        config.engine_args_vec(),
    ));
    let supervisor = Supervisor::new(
        source,
        registry.clone(),
        health.clone(),
        metrics,
        config.supervisor_config(),
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let state = Arc::new(api::AppState::new(registry, health.clone()));

    let mut server = tokio::spawn(api::serve(config.port, state, shutdown_tx.subscribe()));
    let mut pipeline = tokio::spawn(supervisor.run(shutdown_tx.subscribe()));

    health.set_ready(true).await;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(());
        }
        // configuration failure or exhausted restart budget: exit nonzero
        res = &mut pipeline => {
            let _ = shutdown_tx.send(());
            let _ = server.await;
            res??;
            anyhow::bail!("event pipeline exited unexpectedly");
        }
        res = &mut server => {
            let _ = shutdown_tx.send(());
            let _ = pipeline.await;
            res??;
            anyhow::bail!("metrics server exited unexpectedly");
        }
    }

    pipeline.await??;
    server.await??;

    info!("oomkill-exporter stopped");
    Ok(())
}
