pub mod guard;

pub use guard::{CompletionGuard, MessageFilter};

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::{decode_created_msg, Consumer};
use crate::config::CorrelatorSettings;
use crate::lead_lists::{LeadListCreatedMsg, LeadListsRepo};

/// The unit of work a worker performs once it has matched its message.
/// Returns the number of processed leads.
#[async_trait]
pub trait LeadProcessor: Send + Sync {
    async fn process(&self, msg: &LeadListCreatedMsg) -> anyhow::Result<i32>;
}

/// How a single worker run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { processed_count: i32 },
    Failed { reason: String },
    TimedOut,
    Cancelled,
    /// The matched record no longer carries this run's correlation id
    /// (deleted or re-dispatched); nothing was written.
    Orphaned,
}

enum SearchOutcome {
    Matched(LeadListCreatedMsg),
    TimedOut,
    Cancelled,
}

enum Decision {
    Matched(LeadListCreatedMsg),
    Requeue,
    RejectPoison,
}

/// Drives one ephemeral worker run: search the queue for the message
/// matching the assigned correlation id within a bounded window, then
/// resolve the outcome into the record exactly once.
pub struct Correlator {
    consumer: Consumer,
    repo: LeadListsRepo,
    lead_list_id: Uuid,
    filter: MessageFilter,
    guard: CompletionGuard,
    settings: CorrelatorSettings,
}

impl Correlator {
    pub fn new(
        consumer: Consumer,
        repo: LeadListsRepo,
        lead_list_id: Uuid,
        correlation_id: Uuid,
        settings: CorrelatorSettings,
    ) -> Self {
        Self {
            consumer,
            repo,
            lead_list_id,
            filter: MessageFilter::new(correlation_id),
            guard: CompletionGuard::new(),
            settings,
        }
    }

    pub async fn run(
        &self,
        processor: &dyn LeadProcessor,
        cancel: CancellationToken,
    ) -> anyhow::Result<RunOutcome> {
        match self.search(&cancel).await? {
            SearchOutcome::Cancelled => {
                tracing::info!(lead_list_id = %self.lead_list_id, "cancelled before a match; exiting gracefully");
                Ok(RunOutcome::Cancelled)
            }
            SearchOutcome::TimedOut => {
                let reason = format!(
                    "no matching job message received within {}s",
                    self.settings.message_timeout_secs
                );
                tracing::warn!(
                    lead_list_id = %self.lead_list_id,
                    correlation_id = %self.filter.correlation_id(),
                    "{reason}"
                );
                self.repo
                    .mark_failed(self.lead_list_id, self.filter.correlation_id(), &reason)
                    .await?;
                Ok(RunOutcome::TimedOut)
            }
            SearchOutcome::Matched(msg) => self.process_matched(processor, &msg).await,
        }
    }

    async fn process_matched(
        &self,
        processor: &dyn LeadProcessor,
        msg: &LeadListCreatedMsg,
    ) -> anyhow::Result<RunOutcome> {
        let owned = self
            .repo
            .mark_processing(self.lead_list_id, self.filter.correlation_id())
            .await?;
        if !owned {
            tracing::warn!(
                lead_list_id = %self.lead_list_id,
                "record missing or re-dispatched under a new correlation id; exiting without changes"
            );
            return Ok(RunOutcome::Orphaned);
        }

        tracing::info!(lead_list_id = %self.lead_list_id, "matching message received, processing");

        match processor.process(msg).await {
            Ok(processed_count) => {
                self.repo
                    .mark_completed(
                        self.lead_list_id,
                        self.filter.correlation_id(),
                        processed_count,
                    )
                    .await?;
                tracing::info!(
                    lead_list_id = %self.lead_list_id,
                    processed_count,
                    "processing completed"
                );
                Ok(RunOutcome::Completed { processed_count })
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(lead_list_id = %self.lead_list_id, error = %reason, "processing failed");
                self.repo
                    .mark_failed(self.lead_list_id, self.filter.correlation_id(), &reason)
                    .await?;
                Ok(RunOutcome::Failed { reason })
            }
        }
    }

    /// The pull loop: one in-flight message at a time, bounded by the
    /// wall-clock window, interruptible at every suspension point.
    async fn search(&self, cancel: &CancellationToken) -> anyhow::Result<SearchOutcome> {
        let window = Duration::from_secs(self.settings.message_timeout_secs);
        let pause = Duration::from_millis(self.settings.poll_interval_ms);
        let started = Instant::now();

        tracing::info!(
            correlation_id = %self.filter.correlation_id(),
            window_secs = self.settings.message_timeout_secs,
            "searching for matching message"
        );

        while started.elapsed() < window {
            if cancel.is_cancelled() {
                return Ok(SearchOutcome::Cancelled);
            }

            if let Some(delivery) = self.consumer.fetch_one().await? {
                match self.classify(&delivery.body) {
                    Decision::Matched(msg) => {
                        if self.guard.try_complete() {
                            self.consumer.ack(&delivery).await?;
                            return Ok(SearchOutcome::Matched(msg));
                        }
                        // Match already claimed: duplicates go back untouched.
                        self.consumer.nack(&delivery, true).await?;
                    }
                    Decision::Requeue => {
                        self.consumer.nack(&delivery, true).await?;
                    }
                    Decision::RejectPoison => {
                        self.consumer.nack(&delivery, false).await?;
                        // Poison hurts nobody else; keep searching now.
                        continue;
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(SearchOutcome::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }

        Ok(SearchOutcome::TimedOut)
    }

    fn classify(&self, body: &str) -> Decision {
        if self.guard.is_complete() {
            tracing::debug!("message already matched; ignoring further deliveries");
            return Decision::Requeue;
        }

        match decode_created_msg(body) {
            Err(e) => {
                tracing::error!(error = %e, "poison message, rejecting permanently");
                Decision::RejectPoison
            }
            Ok(msg) if self.filter.is_mine(&msg) => Decision::Matched(msg),
            Ok(msg) => {
                tracing::warn!(
                    expected = %self.filter.correlation_id(),
                    received = %msg.correlation_id,
                    "correlation id mismatch, requeuing"
                );
                Decision::Requeue
            }
        }
    }
}
