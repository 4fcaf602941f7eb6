//! Exporter self-metrics
//!
//! Pipeline counters (lines read, events observed, parse failures, engine
//! restarts) and a parse latency histogram, registered once on the global
//! Prometheus registry. Event-labeled series live in
//! [`crate::registry::MetricRegistry`] instead; these are about the exporter
//! itself.

use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter};
use std::sync::OnceLock;

/// Parse latency buckets in seconds. Records are tiny; the tail exists to
/// catch pathological lines.
const PARSE_LATENCY_BUCKETS: &[f64] = &[0.000001, 0.00001, 0.0001, 0.001, 0.01, 0.1];

static GLOBAL_METRICS: OnceLock<ExporterMetricsInner> = OnceLock::new();

struct ExporterMetricsInner {
    lines_total: IntCounter,
    events_total: IntCounter,
    parse_failures_total: IntCounter,
    source_restarts_total: IntCounter,
    parse_latency_seconds: Histogram,
}

impl ExporterMetricsInner {
    fn new() -> Self {
        Self {
            lines_total: register_int_counter!(
                "oomkill_exporter_lines_total",
                "Raw lines read from the tracing engine"
            )
            .expect("Failed to register lines_total"),

            events_total: register_int_counter!(
                "oomkill_exporter_events_total",
                "Lines successfully parsed into kill events"
            )
            .expect("Failed to register events_total"),

            parse_failures_total: register_int_counter!(
                "oomkill_exporter_parse_failures_total",
                "Lines dropped because they failed to parse"
            )
            .expect("Failed to register parse_failures_total"),

            source_restarts_total: register_int_counter!(
                "oomkill_exporter_source_restarts_total",
                "Unexpected tracing engine terminations followed by a restart"
            )
            .expect("Failed to register source_restarts_total"),

            parse_latency_seconds: register_histogram!(
                "oomkill_exporter_parse_latency_seconds",
                "Time spent parsing one engine record",
                PARSE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register parse_latency_seconds"),
        }
    }
}

/// Lightweight handle to the global self-metrics; clones share state.
#[derive(Clone)]
pub struct ExporterMetrics {
    _private: (),
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ExporterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ExporterMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_lines(&self) {
        self.inner().lines_total.inc();
    }

    pub fn inc_events(&self) {
        self.inner().events_total.inc();
    }

    pub fn inc_parse_failures(&self) {
        self.inner().parse_failures_total.inc();
    }

    pub fn inc_source_restarts(&self) {
        self.inner().source_restarts_total.inc();
    }

    pub fn observe_parse_latency(&self, duration_secs: f64) {
        self.inner().parse_latency_seconds.observe(duration_secs);
    }
}
