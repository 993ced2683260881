use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use leadflow::channel::Consumer;
use leadflow::config::Config;
use leadflow::correlator::{Correlator, RunOutcome};
use leadflow::db;
use leadflow::lead_lists::LeadListsRepo;

mod env;
mod processor;

use env::WorkerTarget;
use processor::SimulatedProcessor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // The identifiers come first: without them there is no record to
    // update, so nothing may be touched.
    let target = match WorkerTarget::from_env() {
        Ok(target) => target,
        Err(e) => {
            tracing::error!(error = %e, "invalid worker environment, shutting down");
            std::process::exit(2);
        }
    };

    tracing::info!(
        lead_list_id = %target.lead_list_id,
        correlation_id = %target.correlation_id,
        "worker starting"
    );

    let cfg = Config::from_env()?;

    let record_pool = db::make_pool(&cfg.database_url).await?;
    let repo = LeadListsRepo::new(record_pool.clone());

    let consumer = match Consumer::connect(&cfg.channel).await {
        Ok(consumer) => consumer,
        Err(e) => {
            // Fatal for this run. Leave the verdict on the record when the
            // record store is still reachable; otherwise logs are all we have.
            tracing::error!(error = %e, "failed to connect to the message channel");
            let reason = format!("broker connection failed: {e}");
            if let Err(db_err) = repo
                .mark_failed(target.lead_list_id, target.correlation_id, &reason)
                .await
            {
                tracing::error!(error = %db_err, "could not record the broker failure");
            }
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(watch_shutdown_signals(cancel.clone()));

    let channel = consumer.clone();
    let correlator = Correlator::new(
        consumer,
        repo,
        target.lead_list_id,
        target.correlation_id,
        cfg.correlator,
    );

    let outcome = correlator.run(&SimulatedProcessor::default(), cancel).await;
    channel.close().await;
    let outcome = outcome?;

    match outcome {
        RunOutcome::Completed { processed_count } => {
            tracing::info!(processed_count, "worker finished: completed")
        }
        RunOutcome::Failed { reason } => tracing::warn!(%reason, "worker finished: failed"),
        RunOutcome::TimedOut => tracing::warn!("worker finished: timed out waiting for message"),
        RunOutcome::Cancelled => tracing::info!("worker finished: cancelled"),
        RunOutcome::Orphaned => tracing::warn!("worker finished: record no longer owned"),
    }

    record_pool.close().await;
    Ok(())
}

async fn watch_shutdown_signals(cancel: CancellationToken) {
    let terminate = async {
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to register SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        }
        #[cfg(not(unix))]
        std::future::pending::<()>().await;
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, cancelling");
    cancel.cancel();
}
