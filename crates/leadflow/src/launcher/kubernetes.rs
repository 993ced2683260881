use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::launcher::{JobLauncher, LaunchError};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Secret holding the worker's connection settings (database/broker URLs);
/// mounted into every worker job via envFrom.
const WORKER_ENV_SECRET: &str = "leadflow-worker-env";

/// Submits a run-to-completion batch Job to the cluster API for each
/// dispatch, using the pod's service-account credentials.
pub struct KubernetesLauncher {
    client: reqwest::Client,
    api_base: String,
    token: String,
    namespace: String,
    worker_image: String,
}

impl KubernetesLauncher {
    /// In-cluster configuration: API host/port from the environment,
    /// bearer token and CA bundle from the service-account mount.
    pub fn from_cluster_env(worker_image: String, namespace: String) -> anyhow::Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| anyhow::anyhow!("KUBERNETES_SERVICE_HOST is missing (not in cluster?)"))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT_HTTPS")
            .or_else(|_| std::env::var("KUBERNETES_SERVICE_PORT"))
            .unwrap_or_else(|_| "443".to_string());

        let token = std::fs::read_to_string(format!("{SERVICE_ACCOUNT_DIR}/token"))?
            .trim()
            .to_string();
        let ca = std::fs::read(format!("{SERVICE_ACCOUNT_DIR}/ca.crt"))?;

        let client = reqwest::Client::builder()
            .add_root_certificate(reqwest::Certificate::from_pem(&ca)?)
            .build()?;

        tracing::info!(%host, %port, %namespace, "kubernetes launcher using in-cluster config");

        Ok(Self {
            client,
            api_base: format!("https://{host}:{port}"),
            token,
            namespace,
            worker_image,
        })
    }

    fn job_manifest(&self, job_id: Uuid, correlation_id: Uuid) -> serde_json::Value {
        json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {
                "name": format!("leadflow-worker-{}", correlation_id.simple()),
                "labels": {
                    "app": "leadflow-worker",
                    "leadflow/lead-list-id": job_id.to_string(),
                }
            },
            "spec": {
                "backoffLimit": 0,
                "ttlSecondsAfterFinished": 300,
                "template": {
                    "spec": {
                        "restartPolicy": "Never",
                        "containers": [{
                            "name": "worker",
                            "image": self.worker_image,
                            "env": [
                                { "name": "LEADLIST_ID", "value": job_id.to_string() },
                                { "name": "CORRELATION_ID", "value": correlation_id.to_string() }
                            ],
                            "envFrom": [
                                { "secretRef": { "name": WORKER_ENV_SECRET } }
                            ]
                        }]
                    }
                }
            }
        })
    }
}

#[async_trait]
impl JobLauncher for KubernetesLauncher {
    async fn launch(&self, job_id: Uuid, correlation_id: Uuid) -> Result<(), LaunchError> {
        let url = format!(
            "{}/apis/batch/v1/namespaces/{}/jobs",
            self.api_base, self.namespace
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&self.job_manifest(job_id, correlation_id))
            .send()
            .await
            .map_err(|e| LaunchError::rejected(format!("cluster API unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LaunchError::rejected(format!(
                "cluster API returned {status}: {body}"
            )));
        }

        tracing::info!(%job_id, %correlation_id, "worker job submitted to cluster");
        Ok(())
    }
}
