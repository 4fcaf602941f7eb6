//! Event source adapter around the external tracing engine
//!
//! The engine is a long-running foreground subprocess that prints one record
//! per OOM kill on stdout. The adapter owns that subprocess: `start` spawns
//! it and hands back a line stream, `stop` tears it down with SIGTERM, a
//! bounded wait, and a SIGKILL fallback. `kill_on_drop` covers abnormal exit
//! paths where `stop` never runs.

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Errors from launching the engine. All of them are configuration-class:
/// restarting cannot fix a missing or unlaunchable binary, so the supervisor
/// treats every `start` failure as fatal. An engine that launched and later
/// died is not an error here; the stream simply ends.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("tracing engine binary not found at {0}")]
    EngineMissing(PathBuf),
    #[error("failed to launch tracing engine: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("tracing engine has no stdout pipe")]
    NoStdout,
}

/// A restartable producer of engine line streams.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn start(&self) -> Result<Box<dyn EventStream>, SourceError>;
}

/// A live engine attachment.
#[async_trait]
pub trait EventStream: Send {
    /// Next raw engine record; `None` once the engine has terminated.
    async fn next_line(&mut self) -> Option<String>;

    /// Terminate the engine and release the subprocess. Always returns
    /// within roughly `grace` plus the cost of a SIGKILL.
    async fn stop(&mut self, grace: Duration);
}

/// Spawns the tracing engine binary and streams its stdout.
pub struct TracerSource {
    program: PathBuf,
    args: Vec<String>,
}

impl TracerSource {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

#[async_trait]
impl EventSource for TracerSource {
    async fn start(&self) -> Result<Box<dyn EventStream>, SourceError> {
        if tokio::fs::metadata(&self.program).await.is_err() {
            return Err(SourceError::EngineMissing(self.program.clone()));
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or(SourceError::NoStdout)?;
        info!(program = %self.program.display(), pid = child.id(), "tracing engine started");

        Ok(Box::new(TracerStream {
            child,
            lines: BufReader::new(stdout).lines(),
        }))
    }
}

struct TracerStream {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl EventStream for TracerStream {
    async fn next_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "error reading tracing engine output");
                None
            }
        }
    }

    async fn stop(&mut self, grace: Duration) {
        if let Ok(Some(status)) = self.child.try_wait() {
            info!(%status, "tracing engine already exited");
            return;
        }

        if let Some(pid) = self.child.id() {
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(error = %e, "failed to signal tracing engine");
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "tracing engine terminated"),
            Ok(Err(e)) => warn!(error = %e, "failed waiting for tracing engine"),
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "tracing engine ignored SIGTERM, killing");
                if let Err(e) = self.child.kill().await {
                    warn!(error = %e, "failed to kill tracing engine");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn shell_source(script: &str) -> TracerSource {
        TracerSource::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_missing_binary_fails_fast() {
        let source = TracerSource::new("/nonexistent/oomkill-engine", Vec::new());
        match source.start().await {
            Err(SourceError::EngineMissing(path)) => {
                assert_eq!(path, PathBuf::from("/nonexistent/oomkill-engine"));
            }
            other => panic!("expected EngineMissing, got {:?}", other.map(|_| "stream")),
        }
    }

    #[tokio::test]
    async fn test_stream_yields_lines_then_ends() {
        let source = shell_source("printf 'first\\nsecond\\n'");
        let mut stream = source.start().await.unwrap();

        assert_eq!(stream.next_line().await.as_deref(), Some("first"));
        assert_eq!(stream.next_line().await.as_deref(), Some("second"));
        assert_eq!(stream.next_line().await, None);

        stream.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_stop_is_bounded() {
        // trap-less sleep dies on SIGTERM, so stop returns well within grace
        let source = shell_source("sleep 30");
        let mut stream = source.start().await.unwrap();

        let start = Instant::now();
        stream.stop(Duration::from_secs(2)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stop_kills_engine_that_ignores_sigterm() {
        let source = shell_source("trap '' TERM; sleep 30");
        let mut stream = source.start().await.unwrap();

        // give the shell a moment to install the trap
        tokio::time::sleep(Duration::from_millis(100)).await;

        let start = Instant::now();
        stream.stop(Duration::from_millis(200)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
