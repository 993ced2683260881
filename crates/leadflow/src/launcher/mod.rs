pub mod docker;
pub mod kubernetes;
pub mod local_process;

pub use docker::DockerLauncher;
pub use kubernetes::KubernetesLauncher;
pub use local_process::LocalProcessLauncher;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::Config;

/// A launch submission that was not accepted. The reason is whatever the
/// underlying runtime reported.
#[derive(Debug, thiserror::Error)]
#[error("submission rejected: {0}")]
pub struct LaunchError(pub String);

impl LaunchError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Starts one ephemeral worker for one dispatch.
///
/// Fire-and-forget: `launch` only accepts or rejects the submission and
/// must not block past it. Results come back through the record store,
/// never through this interface.
#[async_trait]
pub trait JobLauncher: Send + Sync {
    async fn launch(&self, job_id: Uuid, correlation_id: Uuid) -> Result<(), LaunchError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LauncherKind {
    Kubernetes,
    Local,
    Docker,
}

impl LauncherKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "kubernetes" | "k8s" => Some(Self::Kubernetes),
            "local" | "local-process" | "process" => Some(Self::Local),
            "docker" => Some(Self::Docker),
            _ => None,
        }
    }
}

/// Build the launcher selected by configuration.
pub fn build(cfg: &Config) -> anyhow::Result<Arc<dyn JobLauncher>> {
    Ok(match cfg.launcher {
        LauncherKind::Kubernetes => Arc::new(KubernetesLauncher::from_cluster_env(
            cfg.worker_image.clone(),
            cfg.kube_namespace.clone(),
        )?),
        LauncherKind::Local => Arc::new(LocalProcessLauncher::new(cfg.worker_command.clone())),
        LauncherKind::Docker => Arc::new(DockerLauncher),
    })
}
