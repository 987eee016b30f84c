// crates/pml-gateway-sandbox/src/worker.rs
// ============================================================================
// Module: Sandbox Workers
// Description: Worker session interface and the subprocess worker.
// Purpose: Run untrusted code in an isolated process speaking NDJSON frames.
// Dependencies: pml-gateway-core, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! A worker boots into an isolated runtime, announces readiness, and then
//! exchanges [`WorkerFrame`] values with the host over a single channel.
//! The subprocess worker spawns the configured runtime command with
//! deny-by-default permission flags and speaks newline-delimited JSON over
//! its stdio; termination kills the process after a short grace period.
//!
//! Security posture: the worker process is untrusted; its frames are
//! validated before use and its lifetime is bounded by the host; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::process::ChildStdout;
use tokio::process::Command;

use pml_gateway_core::types::permission::PermissionSet;

use crate::permissions::permission_flags;
use crate::protocol::WorkerFrame;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Grace period between kill request and forced reap.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(2_000);

// ============================================================================
// SECTION: Worker Errors
// ============================================================================

/// Errors raised by worker sessions.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker process failed to spawn.
    #[error("worker spawn failed: {0}")]
    Spawn(String),
    /// The worker did not announce readiness in time.
    #[error("worker not ready within {0:?}")]
    NotReady(Duration),
    /// Channel I/O failed.
    #[error("worker channel failure: {0}")]
    Channel(String),
    /// The worker sent a frame that does not parse.
    #[error("malformed worker frame: {0}")]
    Protocol(String),
    /// The worker closed its channel.
    #[error("worker channel closed")]
    Closed,
}

// ============================================================================
// SECTION: Worker Interface
// ============================================================================

/// Factory for isolated worker sessions.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Boots a worker under the given permission set and returns its
    /// session once ready.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the worker cannot boot.
    async fn start(
        &self,
        permission_set: PermissionSet,
    ) -> Result<Box<dyn WorkerSession>, WorkerError>;
}

/// One live worker channel.
#[async_trait]
pub trait WorkerSession: Send {
    /// Sends a frame to the worker.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the channel is closed or I/O fails.
    async fn send(&mut self, frame: WorkerFrame) -> Result<(), WorkerError>;

    /// Receives the next frame from the worker.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] when the channel closes or a frame is
    /// malformed.
    async fn recv(&mut self) -> Result<WorkerFrame, WorkerError>;

    /// Kills the worker and releases its resources. Idempotent.
    async fn terminate(&mut self);
}

// ============================================================================
// SECTION: Subprocess Worker
// ============================================================================

/// Configuration for the subprocess worker.
///
/// # Invariants
/// - `command` is non-empty; the first element is the runtime binary.
#[derive(Debug, Clone)]
pub struct SubprocessWorkerConfig {
    /// Runtime command (binary plus fixed arguments).
    pub command: Vec<String>,
    /// Deadline for the readiness handshake.
    pub ready_timeout: Duration,
}

impl SubprocessWorkerConfig {
    /// Creates a config with the default readiness deadline.
    #[must_use]
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            ready_timeout: Duration::from_secs(10),
        }
    }
}

/// Spawns isolated runtime subprocesses with permission flags.
pub struct SubprocessWorker {
    /// Worker configuration.
    config: SubprocessWorkerConfig,
}

impl SubprocessWorker {
    /// Creates a subprocess worker factory.
    #[must_use]
    pub fn new(config: SubprocessWorkerConfig) -> Self {
        Self {
            config,
        }
    }
}

#[async_trait]
impl Worker for SubprocessWorker {
    async fn start(
        &self,
        permission_set: PermissionSet,
    ) -> Result<Box<dyn WorkerSession>, WorkerError> {
        let (binary, fixed_args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| WorkerError::Spawn("empty worker command".to_string()))?;
        let mut command = Command::new(binary);
        command
            .args(fixed_args)
            .args(permission_flags(permission_set))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .env_clear()
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(|err| WorkerError::Spawn(err.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Spawn("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Spawn("worker stdout unavailable".to_string()))?;
        let mut session = SubprocessSession {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            terminated: false,
        };
        // Readiness handshake bounds worker boot time.
        let ready = tokio::time::timeout(self.config.ready_timeout, session.recv()).await;
        match ready {
            Ok(Ok(WorkerFrame::Ready)) => Ok(Box::new(session)),
            Ok(Ok(frame)) => {
                session.terminate().await;
                Err(WorkerError::Protocol(format!("expected ready frame, got {frame:?}")))
            }
            Ok(Err(err)) => {
                session.terminate().await;
                Err(err)
            }
            Err(_) => {
                session.terminate().await;
                Err(WorkerError::NotReady(self.config.ready_timeout))
            }
        }
    }
}

/// Live subprocess session over stdio.
struct SubprocessSession {
    /// The worker process.
    child: Child,
    /// Worker stdin (host to worker frames).
    stdin: ChildStdin,
    /// Worker stdout (worker to host frames).
    stdout: BufReader<ChildStdout>,
    /// Whether terminate already ran.
    terminated: bool,
}

#[async_trait]
impl WorkerSession for SubprocessSession {
    async fn send(&mut self, frame: WorkerFrame) -> Result<(), WorkerError> {
        let mut line = serde_json::to_string(&frame)
            .map_err(|err| WorkerError::Channel(err.to_string()))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|err| WorkerError::Channel(err.to_string()))?;
        self.stdin.flush().await.map_err(|err| WorkerError::Channel(err.to_string()))
    }

    async fn recv(&mut self) -> Result<WorkerFrame, WorkerError> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(|err| WorkerError::Channel(err.to_string()))?;
        if read == 0 {
            return Err(WorkerError::Closed);
        }
        serde_json::from_str(line.trim())
            .map_err(|err| WorkerError::Protocol(format!("{err}: {}", line.trim())))
    }

    async fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        if self.child.start_kill().is_err() {
            return;
        }
        let reaped = tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await;
        if reaped.is_err() {
            tracing::warn!("worker did not exit within grace period");
        }
    }
}
