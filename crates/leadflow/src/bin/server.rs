use leadflow::api::{self, ApiState};
use leadflow::channel;
use leadflow::config::Config;
use leadflow::db;
use leadflow::launcher;
use leadflow::lead_lists::{LeadListService, LeadListsRepo};

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = Config::from_env()?;

    tracing::info!(
        http_addr = %cfg.http_addr,
        launcher = ?cfg.launcher,
        launch_failure_policy = ?cfg.launch_failure_policy,
        exchange = %cfg.channel.exchange,
        queue = %cfg.channel.queue,
        routing_key = %cfg.channel.routing_key,
        "leadflow server starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    channel::declare_topology(&pool, &cfg.channel).await?;

    let launcher = launcher::build(&cfg)?;
    let repo = LeadListsRepo::new(pool.clone());
    let service = LeadListService::new(
        repo,
        launcher,
        cfg.channel.clone(),
        cfg.launch_failure_policy,
    );

    let app = api::router(ApiState { service });
    let listener = tokio::net::TcpListener::bind(&cfg.http_addr).await?;
    tracing::info!("listening on http://{}", cfg.http_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
