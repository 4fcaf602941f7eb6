//! Pipeline supervision
//!
//! The supervisor owns the source → parser → registry pipeline: it starts
//! the tracing engine, drains its line stream into the registry, and applies
//! the restart policy when the engine dies underneath it. Engine restart is
//! the only retried operation in the exporter.

use crate::health::{components, HealthRegistry};
use crate::observability::ExporterMetrics;
use crate::parser;
use crate::registry::MetricRegistry;
use crate::source::EventSource;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Backoff before the first restart attempt.
    pub initial_backoff: Duration,
    /// Backoff ceiling; doubling stops here.
    pub max_backoff: Duration,
    /// Consecutive restart attempts before giving up; 0 retries forever.
    pub max_restart_attempts: u32,
    /// Grace period for engine teardown on stop.
    pub stop_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_restart_attempts: 0,
            stop_grace: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    Restarting,
    Stopped,
}

pub struct Supervisor {
    source: Arc<dyn EventSource>,
    registry: Arc<MetricRegistry>,
    health: HealthRegistry,
    metrics: ExporterMetrics,
    config: SupervisorConfig,
    state_tx: watch::Sender<SupervisorState>,
}

impl Supervisor {
    pub fn new(
        source: Arc<dyn EventSource>,
        registry: Arc<MetricRegistry>,
        health: HealthRegistry,
        metrics: ExporterMetrics,
        config: SupervisorConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Starting);
        Self {
            source,
            registry,
            health,
            metrics,
            config,
            state_tx,
        }
    }

    /// Observe state transitions; used by probes and tests.
    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: SupervisorState) {
        let _ = self.state_tx.send(state);
    }

    /// Drive the pipeline until shutdown. Returns `Ok` on a clean shutdown,
    /// `Err` on a configuration failure or an exhausted restart budget;
    /// either way the engine subprocess has been released.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut attempts: u32 = 0;
        let mut backoff = self.config.initial_backoff;

        loop {
            let mut stream = match self.source.start().await {
                Ok(stream) => stream,
                Err(e) => {
                    self.health
                        .set_unhealthy(components::SOURCE, e.to_string())
                        .await;
                    self.set_state(SupervisorState::Stopped);
                    return Err(e).context("failed to start tracing engine");
                }
            };
            self.health.set_healthy(components::SOURCE).await;
            self.set_state(SupervisorState::Running);
            let started_at = Instant::now();

            let shutting_down = loop {
                tokio::select! {
                    line = stream.next_line() => match line {
                        Some(line) => self.ingest(&line),
                        None => break false,
                    },
                    _ = shutdown.recv() => break true,
                }
            };

            stream.stop(self.config.stop_grace).await;

            if shutting_down {
                info!("event pipeline stopped");
                self.set_state(SupervisorState::Stopped);
                return Ok(());
            }

            // a stretch of healthy uptime forgives earlier crashes
            if started_at.elapsed() >= self.config.max_backoff {
                attempts = 0;
                backoff = self.config.initial_backoff;
            }

            attempts += 1;
            if self.config.max_restart_attempts > 0 && attempts > self.config.max_restart_attempts {
                self.health
                    .set_unhealthy(components::SOURCE, "restart attempts exhausted")
                    .await;
                self.set_state(SupervisorState::Stopped);
                bail!(
                    "tracing engine kept crashing, giving up after {} restart attempts",
                    self.config.max_restart_attempts
                );
            }

            self.metrics.inc_source_restarts();
            self.set_state(SupervisorState::Restarting);
            self.health
                .set_degraded(components::SOURCE, format!("restarting, attempt {attempts}"))
                .await;
            warn!(
                attempt = attempts,
                backoff_ms = backoff.as_millis() as u64,
                "tracing engine terminated unexpectedly, restarting"
            );

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.recv() => {
                    info!("event pipeline stopped during restart backoff");
                    self.set_state(SupervisorState::Stopped);
                    return Ok(());
                }
            }
            backoff = next_backoff(backoff, self.config.max_backoff);
        }
    }

    /// One raw line through the parser into the registry. A bad line is
    /// counted, logged, and dropped; it never stops the loop.
    fn ingest(&self, line: &str) {
        self.metrics.inc_lines();
        let start = Instant::now();
        match parser::parse(line) {
            Ok(event) => {
                self.metrics
                    .observe_parse_latency(start.elapsed().as_secs_f64());
                debug!(
                    host_pid = event.host_pid,
                    container_id = %event.container_id,
                    command = %event.command,
                    "observed oom kill"
                );
                self.registry.observe(event);
                self.metrics.inc_events();
            }
            Err(e) => {
                self.metrics.inc_parse_failures();
                warn!(error = %e, line = line, "dropping malformed engine record");
            }
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}
