use crate::launcher::LauncherKind;

/// Runtime configuration for the control-plane server and the worker.
///
/// Loaded once from environment variables into a typed struct; components
/// receive the pieces they need at construction and never read the
/// environment mid-logic.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub http_addr: String,
    pub migrate_on_startup: bool,
    pub launcher: LauncherKind,
    pub launch_failure_policy: LaunchFailurePolicy,
    pub worker_command: String,
    pub worker_image: String,
    pub kube_namespace: String,
    pub channel: ChannelSettings,
    pub correlator: CorrelatorSettings,
}

/// What to do with the dispatch transaction when the worker launch
/// submission is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchFailurePolicy {
    /// Abort the transaction: no record, no message, caller gets an error.
    Rollback,
    /// Commit anyway; the record stays Pending awaiting a manual retry.
    KeepPending,
}

impl LaunchFailurePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "rollback" => Some(Self::Rollback),
            "keep-pending" | "keep_pending" | "keep" => Some(Self::KeepPending),
            _ => None,
        }
    }
}

/// Message channel topology and connection parameters.
#[derive(Clone, Debug)]
pub struct ChannelSettings {
    pub database_url: String,
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub retry_exchange: String,
    pub prefetch_count: u16,
    pub visibility_secs: i64,
}

/// Timing knobs for the worker's poll-and-match loop.
#[derive(Clone, Copy, Debug)]
pub struct CorrelatorSettings {
    pub message_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let http_addr = env_nonempty("HTTP_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let migrate_on_startup = env_bool("MIGRATE_ON_STARTUP").unwrap_or(false);

        let launcher = match env_nonempty("LAUNCHER") {
            Some(s) => LauncherKind::parse(&s)
                .ok_or_else(|| anyhow::anyhow!("LAUNCHER must be kubernetes, local or docker"))?,
            None => LauncherKind::Local,
        };

        let launch_failure_policy = match env_nonempty("LAUNCH_FAILURE_POLICY") {
            Some(s) => LaunchFailurePolicy::parse(&s).ok_or_else(|| {
                anyhow::anyhow!("LAUNCH_FAILURE_POLICY must be rollback or keep-pending")
            })?,
            None => LaunchFailurePolicy::Rollback,
        };

        let worker_command =
            env_nonempty("WORKER_COMMAND").unwrap_or_else(|| "leadflow-worker".to_string());
        let worker_image =
            env_nonempty("WORKER_IMAGE").unwrap_or_else(|| "leadflow-worker:latest".to_string());
        let kube_namespace = env_nonempty("KUBE_NAMESPACE").unwrap_or_else(|| "dev".to_string());

        let channel = ChannelSettings::from_env(&database_url)?;
        let correlator = CorrelatorSettings::from_env();

        Ok(Self {
            database_url,
            http_addr,
            migrate_on_startup,
            launcher,
            launch_failure_policy,
            worker_command,
            worker_image,
            kube_namespace,
            channel,
            correlator,
        })
    }
}

impl ChannelSettings {
    /// Broker connection parameters come from BROKER_* variables; a full
    /// BROKER_DATABASE_URL wins over host/port/credentials, and a
    /// single-node deployment falls back to the record-store URL.
    pub fn from_env(fallback_url: &str) -> anyhow::Result<Self> {
        let database_url = match env_nonempty("BROKER_DATABASE_URL") {
            Some(url) => url,
            None => match env_nonempty("BROKER_HOST") {
                Some(host) => {
                    let port = env_nonempty("BROKER_PORT").unwrap_or_else(|| "5432".to_string());
                    let user = env_nonempty("BROKER_USER").unwrap_or_else(|| "postgres".to_string());
                    let pass = env_nonempty("BROKER_PASS").unwrap_or_default();
                    let db = env_nonempty("BROKER_DATABASE").unwrap_or_else(|| "leadflow".to_string());
                    format!("postgres://{user}:{pass}@{host}:{port}/{db}")
                }
                None => fallback_url.to_string(),
            },
        };

        let prefetch_count: u16 = env_nonempty("BROKER_PREFETCH_COUNT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        if prefetch_count == 0 {
            anyhow::bail!("BROKER_PREFETCH_COUNT must be >= 1");
        }

        Ok(Self {
            database_url,
            exchange: env_nonempty("BROKER_EXCHANGE").unwrap_or_else(|| "leadlists".to_string()),
            queue: env_nonempty("BROKER_QUEUE").unwrap_or_else(|| "leadlists.worker".to_string()),
            routing_key: env_nonempty("BROKER_ROUTING_KEY")
                .unwrap_or_else(|| "leadlist.created".to_string()),
            retry_exchange: env_nonempty("BROKER_RETRY_EXCHANGE")
                .unwrap_or_else(|| "leadlists.retry".to_string()),
            prefetch_count,
            visibility_secs: env_nonempty("BROKER_VISIBILITY_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        })
    }
}

impl CorrelatorSettings {
    pub fn from_env() -> Self {
        Self {
            message_timeout_secs: env_nonempty("WORKER_MESSAGE_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            poll_interval_ms: env_nonempty("WORKER_POLL_INTERVAL_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
