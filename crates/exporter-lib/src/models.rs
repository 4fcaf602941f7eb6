//! Core data models for the exporter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single named value reported by the tracing engine.
///
/// Engine records are loosely typed: anything that parses as an integer is
/// kept as one, everything else stays a string. A missing key is represented
/// by absence, never by a zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Str(String),
}

impl FieldValue {
    /// Integer view of the value, when it is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Str(_) => None,
        }
    }
}

/// One named stats bucket from an engine record.
pub type StatMap = BTreeMap<String, FieldValue>;

/// One OOM-kill decision, normalized from a single engine record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OomKillEvent {
    /// Event time, millisecond precision.
    pub timestamp: DateTime<Utc>,
    /// Host-namespace PID of the killed process.
    pub host_pid: u32,
    /// Best-effort container identity; empty when extraction failed.
    pub container_id: String,
    /// Raw cgroup path(s) exactly as reported by the engine.
    pub cgroup_path: String,
    /// Executable name of the killed process, as reported.
    pub command: String,
    /// `mm_*` / `oc_*` fields: pages considered, badness score, RSS breakdown.
    pub memory_stats: StatMap,
    /// `memcg_*` fields: usage, limits, swap, swappiness.
    pub cgroup_stats: StatMap,
    /// `proc_*` fields: oom_score_adj, threads, faults, CPU times, uptime.
    pub process_stats: StatMap,
}

impl OomKillEvent {
    /// Look up an integer stat across the three buckets.
    pub fn stat_int(&self, key: &str) -> Option<i64> {
        self.memory_stats
            .get(key)
            .or_else(|| self.cgroup_stats.get(key))
            .or_else(|| self.process_stats.get(key))
            .and_then(FieldValue::as_int)
    }
}
