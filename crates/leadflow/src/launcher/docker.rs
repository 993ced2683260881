use async_trait::async_trait;
use uuid::Uuid;

use crate::launcher::{JobLauncher, LaunchError};

/// Placeholder for the container-runtime strategy. Accepts every
/// submission and starts nothing; dispatch proceeds as if a worker were
/// on its way.
pub struct DockerLauncher;

#[async_trait]
impl JobLauncher for DockerLauncher {
    async fn launch(&self, job_id: Uuid, correlation_id: Uuid) -> Result<(), LaunchError> {
        tracing::info!(%job_id, %correlation_id, "docker launcher not implemented, skipping");
        Ok(())
    }
}
