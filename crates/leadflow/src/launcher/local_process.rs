use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use crate::launcher::{JobLauncher, LaunchError};

/// Spawns the worker binary as a detached local process. Single-node and
/// development deployments.
pub struct LocalProcessLauncher {
    worker_command: String,
}

impl LocalProcessLauncher {
    pub fn new(worker_command: String) -> Self {
        Self { worker_command }
    }
}

#[async_trait]
impl JobLauncher for LocalProcessLauncher {
    async fn launch(&self, job_id: Uuid, correlation_id: Uuid) -> Result<(), LaunchError> {
        tracing::info!(%job_id, %correlation_id, command = %self.worker_command, "spawning local worker process");

        let mut parts = self.worker_command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| LaunchError::rejected("worker command is empty"))?;

        Command::new(program)
            .args(parts)
            .env("LEADLIST_ID", job_id.to_string())
            .env("CORRELATION_ID", correlation_id.to_string())
            .stdin(std::process::Stdio::null())
            .spawn()
            .map_err(|e| LaunchError::rejected(format!("failed to spawn worker: {e}")))?;

        // The child is intentionally not awaited: it reports through the
        // record store and exits on its own.
        Ok(())
    }
}
