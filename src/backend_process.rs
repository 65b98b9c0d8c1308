//! Lifecycle of a locally spawned model server
//!
//! The server is optional: when no binary is configured the service talks to
//! whatever is already listening at the base URL.

use crate::catalog::discover_models;
use crate::llm::{ChatBackend, LlmError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start {bin}: {source}")]
    Spawn {
        bin: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to stop model server: {0}")]
    Stop(#[source] std::io::Error),
}

/// Owned handle to a `serve` child process. The child is killed on drop.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    bin: PathBuf,
}

impl ProcessHandle {
    /// Run `<bin> serve`
    pub fn start(bin: impl AsRef<Path>) -> Result<Self, ProcessError> {
        let bin = bin.as_ref().to_path_buf();
        let child = Command::new(&bin)
            .arg("serve")
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                bin: bin.clone(),
                source,
            })?;

        tracing::info!(bin = %bin.display(), pid = ?child.id(), "Started model server");
        Ok(Self { child, bin })
    }

    /// Kill the server and reap it
    pub async fn stop(mut self) -> Result<(), ProcessError> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(bin = %self.bin.display(), %status, "Model server already exited");
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => return Err(ProcessError::Stop(e)),
        }
        self.child.kill().await.map_err(ProcessError::Stop)?;
        tracing::info!(bin = %self.bin.display(), "Stopped model server");
        Ok(())
    }
}

/// How long to wait for the backend to answer a model listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Poll the backend until it lists its models.
///
/// Only transient failures (connection refused and the like) are retried.
/// Returns the last error once the timeout elapses.
pub async fn wait_until_ready<B: ChatBackend + ?Sized>(
    backend: &B,
    policy: ReadinessPolicy,
) -> Result<Vec<String>, LlmError> {
    let deadline = tokio::time::Instant::now() + policy.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match discover_models(backend).await {
            Ok(models) => {
                tracing::info!(attempts, models = models.len(), "Model server is ready");
                return Ok(models);
            }
            Err(e) if e.kind.is_transient() && tokio::time::Instant::now() + policy.interval < deadline => {
                tracing::debug!(attempts, error = %e, "Model server not ready yet");
                tokio::time::sleep(policy.interval).await;
            }
            Err(e) => {
                tracing::warn!(attempts, error = %e, "Model server did not become ready");
                return Err(e);
            }
        }
    }
}
