//! Label-keyed kill counters and last-kill state
//!
//! The registry is the only mutable state shared between the ingestion
//! pipeline and the HTTP server. One mutex guards the whole map: an
//! `observe` is all-or-nothing from a reader's point of view, and a
//! `snapshot` is a point-in-time copy whose cost is O(distinct label sets),
//! independent of event rate.

use crate::models::{FieldValue, OomKillEvent, StatMap};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Dimension values identifying one series. Low cardinality by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelSet {
    pub container_id: String,
    pub command: String,
}

/// Per-label aggregate: monotonic kill count plus the stats of the most
/// recent kill, overwritten whole on each observation.
#[derive(Debug, Clone)]
pub struct LabelEntry {
    pub kills: u64,
    pub timestamp: DateTime<Utc>,
    pub memory_stats: StatMap,
    pub cgroup_stats: StatMap,
    pub process_stats: StatMap,
}

impl LabelEntry {
    /// Look up an integer stat across the three buckets.
    pub fn stat_int(&self, key: &str) -> Option<i64> {
        self.memory_stats
            .get(key)
            .or_else(|| self.cgroup_stats.get(key))
            .or_else(|| self.process_stats.get(key))
            .and_then(FieldValue::as_int)
    }
}

/// Immutable point-in-time copy of the registry for exposition.
pub type RegistrySnapshot = Vec<(LabelSet, LabelEntry)>;

#[derive(Debug, Default)]
pub struct MetricRegistry {
    entries: Mutex<HashMap<LabelSet, LabelEntry>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one event: bump the label's kill counter and overwrite its
    /// last-kill state under a single critical section, so a concurrent
    /// snapshot sees either the whole update or none of it.
    pub fn observe(&self, event: OomKillEvent) {
        let OomKillEvent {
            timestamp,
            container_id,
            command,
            memory_stats,
            cgroup_stats,
            process_stats,
            ..
        } = event;
        let labels = LabelSet {
            container_id,
            command,
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(labels).or_insert_with(|| LabelEntry {
            kills: 0,
            timestamp,
            memory_stats: StatMap::new(),
            cgroup_stats: StatMap::new(),
            process_stats: StatMap::new(),
        });
        entry.kills += 1;
        entry.timestamp = timestamp;
        entry.memory_stats = memory_stats;
        entry.cgroup_stats = cgroup_stats;
        entry.process_stats = process_stats;
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
