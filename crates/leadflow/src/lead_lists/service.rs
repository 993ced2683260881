use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::channel::publisher::publish_message;
use crate::config::{ChannelSettings, LaunchFailurePolicy};
use crate::error::{Error, Result};
use crate::launcher::JobLauncher;
use crate::lead_lists::model::{LeadList, LeadListCreatedMsg, LeadListStatus, NewLeadList};
use crate::lead_lists::repo::{new_pending, LeadListsRepo};

const MAX_NAME_LEN: usize = 100;
const MAX_SOURCE_URL_LEN: usize = 500;

/// Owns the lead-list lifecycle on the control-plane side: creation,
/// edit/delete guards, reprocessing, and the dispatch transaction that
/// hands a record to an ephemeral worker.
#[derive(Clone)]
pub struct LeadListService {
    repo: LeadListsRepo,
    launcher: Arc<dyn JobLauncher>,
    channel: ChannelSettings,
    launch_failure_policy: LaunchFailurePolicy,
}

impl LeadListService {
    pub fn new(
        repo: LeadListsRepo,
        launcher: Arc<dyn JobLauncher>,
        channel: ChannelSettings,
        launch_failure_policy: LaunchFailurePolicy,
    ) -> Self {
        Self {
            repo,
            launcher,
            channel,
            launch_failure_policy,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<LeadList> {
        self.repo.get(id).await?.ok_or(Error::NotFound(id))
    }

    pub async fn list(
        &self,
        status: Option<&str>,
        q: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<LeadList>, i64)> {
        // An unknown status filter matches the original behavior: ignored.
        let status = status.and_then(LeadListStatus::parse);
        Ok(self.repo.list(status, q, page, page_size).await?)
    }

    pub async fn metrics_snapshot(&self) -> Result<(i64, i64, i64, i64)> {
        Ok(self.repo.metrics_snapshot().await?)
    }

    /// Create a record and dispatch a worker for it.
    ///
    /// Insert, publish and launch happen under one transaction: if any of
    /// them is refused, nothing is visible afterwards (subject to the
    /// launch-failure policy).
    pub async fn create(&self, req: NewLeadList) -> Result<LeadList> {
        validate(&req.name, &req.source_url)?;

        let lead_list = new_pending(&req.name, &req.source_url);
        let msg = LeadListCreatedMsg::for_dispatch(&lead_list);

        let mut tx = self.repo.pool().begin().await?;
        LeadListsRepo::insert_on(&mut tx, &lead_list).await?;
        self.publish_created(&mut tx, &msg).await?;

        tracing::info!(
            lead_list_id = %lead_list.id,
            correlation_id = %lead_list.correlation_id,
            "lead list created, dispatching worker"
        );

        match self.launcher.launch(lead_list.id, lead_list.correlation_id).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(lead_list)
            }
            Err(e) => self.handle_launch_failure(tx, lead_list, e).await,
        }
    }

    pub async fn update(&self, id: Uuid, req: NewLeadList) -> Result<LeadList> {
        validate(&req.name, &req.source_url)?;

        let lead_list = self.get(id).await?;
        if !lead_list.is_editable() {
            return Err(Error::StateConflict {
                action: "update",
                status: lead_list.status,
            });
        }

        self.repo
            .update_details(id, req.name.trim(), req.source_url.trim())
            .await?
            .ok_or(Error::NotFound(id))
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let lead_list = self.get(id).await?;
        if !lead_list.is_deletable() {
            return Err(Error::StateConflict {
                action: "delete",
                status: lead_list.status,
            });
        }

        self.repo.delete(id).await?;
        tracing::info!(lead_list_id = %id, "lead list deleted");
        Ok(())
    }

    /// Send a failed record through the pipeline again.
    ///
    /// Only Failed records qualify. The record goes back to Pending with a
    /// fresh correlation id, which orphans any straggling worker from the
    /// previous run; the new dispatch rides the same transaction shape as
    /// `create`.
    pub async fn reprocess(&self, id: Uuid) -> Result<LeadList> {
        let lead_list = self.get(id).await?;
        if LeadListStatus::parse(&lead_list.status) != Some(LeadListStatus::Failed) {
            return Err(Error::StateConflict {
                action: "reprocess",
                status: lead_list.status,
            });
        }

        let new_correlation_id = Uuid::new_v4();

        let mut tx = self.repo.pool().begin().await?;
        let updated = LeadListsRepo::reset_for_reprocess_on(&mut tx, id, new_correlation_id)
            .await?
            .ok_or(Error::NotFound(id))?;

        let msg = LeadListCreatedMsg::for_dispatch(&updated);
        self.publish_created(&mut tx, &msg).await?;

        tracing::info!(
            lead_list_id = %id,
            correlation_id = %new_correlation_id,
            "lead list marked for reprocessing"
        );

        match self.launcher.launch(updated.id, updated.correlation_id).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(updated)
            }
            Err(e) => self.handle_launch_failure(tx, updated, e).await,
        }
    }

    async fn publish_created(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        msg: &LeadListCreatedMsg,
    ) -> Result<()> {
        let body = serde_json::to_string(msg).map_err(anyhow::Error::from)?;
        publish_message(
            tx,
            &self.channel.exchange,
            &self.channel.routing_key,
            &body,
            Utc::now(),
        )
        .await?;
        Ok(())
    }

    async fn handle_launch_failure(
        &self,
        tx: sqlx::Transaction<'_, sqlx::Postgres>,
        lead_list: LeadList,
        err: crate::launcher::LaunchError,
    ) -> Result<LeadList> {
        match self.launch_failure_policy {
            LaunchFailurePolicy::Rollback => {
                tx.rollback().await?;
                tracing::error!(
                    lead_list_id = %lead_list.id,
                    error = %err,
                    "worker launch rejected; dispatch rolled back"
                );
                Err(Error::Launch(err))
            }
            LaunchFailurePolicy::KeepPending => {
                tx.commit().await?;
                tracing::warn!(
                    lead_list_id = %lead_list.id,
                    error = %err,
                    "worker launch rejected; record kept pending for manual retry"
                );
                Ok(lead_list)
            }
        }
    }
}

fn validate(name: &str, source_url: &str) -> Result<()> {
    let name = name.trim();
    let source_url = source_url.trim();

    if name.is_empty() {
        return Err(Error::Validation("name is required".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if source_url.is_empty() {
        return Err(Error::Validation("sourceUrl is required".into()));
    }
    if source_url.len() > MAX_SOURCE_URL_LEN {
        return Err(Error::Validation(format!(
            "sourceUrl must be at most {MAX_SOURCE_URL_LEN} characters"
        )));
    }
    Ok(())
}
