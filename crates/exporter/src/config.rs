//! Exporter configuration

use anyhow::Result;
use exporter_lib::SupervisorConfig;
use serde::Deserialize;
use std::time::Duration;

/// Exporter configuration, read from `OOMKILL_*` environment variables.
/// Only these options are recognized; anything else is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Metrics endpoint port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the tracing-engine binary
    #[serde(default = "default_engine_path")]
    pub engine_path: String,

    /// Extra arguments for the engine invocation, space separated
    #[serde(default)]
    pub engine_args: String,

    /// Backoff before the first engine restart, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Restart attempts before giving up; 0 retries forever
    #[serde(default)]
    pub max_restart_attempts: u32,

    /// Grace period for engine teardown, in milliseconds
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

fn default_port() -> u16 {
    9262
}

fn default_engine_path() -> String {
    "/usr/share/bcc/tools/oomkill".to_string()
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_stop_grace_ms() -> u64 {
    3_000
}

impl ExporterConfig {
    /// Load configuration from the environment. An unparseable value is a
    /// configuration error, not a silent fallback to defaults.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("OOMKILL"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn engine_args_vec(&self) -> Vec<String> {
        self.engine_args
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            max_restart_attempts: self.max_restart_attempts,
            stop_grace: Duration::from_millis(self.stop_grace_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ExporterConfig {
        serde_json::from_str("{}").unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = defaults();
        assert_eq!(config.port, 9262);
        assert_eq!(config.engine_path, "/usr/share/bcc/tools/oomkill");
        assert_eq!(config.max_restart_attempts, 0);
        assert!(config.engine_args_vec().is_empty());
    }

    #[test]
    fn test_supervisor_config_conversion() {
        let config = defaults();
        let sup = config.supervisor_config();
        assert_eq!(sup.initial_backoff, Duration::from_millis(500));
        assert_eq!(sup.max_backoff, Duration::from_millis(30_000));
        assert_eq!(sup.stop_grace, Duration::from_millis(3_000));
    }

    #[test]
    fn test_engine_args_split() {
        let mut config = defaults();
        config.engine_args = "--cgroup-info  --verbose".to_string();
        assert_eq!(config.engine_args_vec(), vec!["--cgroup-info", "--verbose"]);
    }
}
