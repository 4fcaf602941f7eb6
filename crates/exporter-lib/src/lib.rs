//! Core library for the OOM-kill exporter
//!
//! This crate provides the pipeline behind the exporter binary:
//! - Event source adapter around the external kernel-tracing engine
//! - Parsing of the engine's `key="value"` records
//! - Label-keyed kill counters and last-kill state
//! - Prometheus text rendering of registry snapshots
//! - Supervision with backoff restart of the engine
//! - Health checks and exporter self-metrics

pub mod exposition;
pub mod health;
pub mod models;
pub mod observability;
pub mod parser;
pub mod registry;
pub mod source;
pub mod supervisor;

pub use health::{ComponentHealth, ComponentStatus, HealthRegistry};
pub use models::{FieldValue, OomKillEvent, StatMap};
pub use observability::ExporterMetrics;
pub use parser::ParseError;
pub use registry::{LabelEntry, LabelSet, MetricRegistry, RegistrySnapshot};
pub use source::{EventSource, EventStream, SourceError, TracerSource};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorState};
