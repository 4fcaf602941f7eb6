//! Snapshot rendering into the Prometheus text format
//!
//! Each scrape renders from a fresh, scrape-local `prometheus::Registry` so
//! the exposed label universe is exactly the snapshot's, then encodes with
//! `TextEncoder`. Rendering never touches the live registry.

use crate::registry::RegistrySnapshot;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

const LABEL_NAMES: &[&str] = &["container_id", "command"];

/// Last-kill gauges: metric name, help text, source field. A gauge is only
/// emitted for a label set whose last event carried the field as an integer.
const LAST_KILL_GAUGES: &[(&str, &str, &str)] = &[
    (
        "oom_kill_last_badness_points",
        "Badness score of the most recently killed process",
        "oc_chosen_points",
    ),
    (
        "oom_kill_last_totalpages",
        "Total pages considered by the kernel for the most recent kill",
        "oc_totalpages",
    ),
    (
        "oom_kill_last_memcg_usage_pages",
        "Memory cgroup usage in pages at the most recent kill",
        "memcg_memory_usage_pages",
    ),
    (
        "oom_kill_last_memcg_limit_pages",
        "Memory cgroup limit in pages at the most recent kill",
        "memcg_memory_limit_pages",
    ),
    (
        "oom_kill_last_rss_anon_pages",
        "Anonymous RSS pages of the most recently killed process",
        "mm_rss_anonpages",
    ),
    (
        "oom_kill_last_rss_file_pages",
        "File-backed RSS pages of the most recently killed process",
        "mm_rss_filepages",
    ),
    (
        "oom_kill_last_pgtables_bytes",
        "Page-table bytes of the most recently killed process",
        "mm_pgtables_bytes",
    ),
];

/// Render a registry snapshot as Prometheus text exposition format.
pub fn render(snapshot: &RegistrySnapshot) -> Result<String, prometheus::Error> {
    let registry = Registry::new();

    let kills = IntCounterVec::new(
        Opts::new("oom_kills_total", "OOM kills observed, by container and command"),
        LABEL_NAMES,
    )?;
    registry.register(Box::new(kills.clone()))?;

    let last_timestamp = IntGaugeVec::new(
        Opts::new(
            "oom_kill_last_timestamp_seconds",
            "Unix time of the most recent kill for this label set",
        ),
        LABEL_NAMES,
    )?;
    registry.register(Box::new(last_timestamp.clone()))?;

    let mut gauges = Vec::with_capacity(LAST_KILL_GAUGES.len());
    for (name, help, field) in LAST_KILL_GAUGES {
        let gauge = IntGaugeVec::new(Opts::new(*name, *help), LABEL_NAMES)?;
        registry.register(Box::new(gauge.clone()))?;
        gauges.push((gauge, *field));
    }

    for (labels, entry) in snapshot {
        let values = [labels.container_id.as_str(), labels.command.as_str()];
        kills.with_label_values(&values).inc_by(entry.kills);
        last_timestamp
            .with_label_values(&values)
            .set(entry.timestamp.timestamp());
        for (gauge, field) in &gauges {
            if let Some(value) = entry.stat_int(field) {
                gauge.with_label_values(&values).set(value);
            }
        }
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
