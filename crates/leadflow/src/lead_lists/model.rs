use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeadList {
    pub id: Uuid,
    pub name: String,
    pub source_url: String,
    pub status: String,
    pub processed_count: i32,
    pub error_message: Option<String>,
    pub correlation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeadList {
    /// Edits are only allowed before a worker has picked the record up or
    /// after it has failed.
    pub fn is_editable(&self) -> bool {
        matches!(
            LeadListStatus::parse(&self.status),
            Some(LeadListStatus::Pending) | Some(LeadListStatus::Failed)
        )
    }

    pub fn is_deletable(&self) -> bool {
        self.is_editable()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadListStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl LeadListStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadListStatus::Pending => "pending",
            LeadListStatus::Processing => "processing",
            LeadListStatus::Completed => "completed",
            LeadListStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(LeadListStatus::Pending),
            "processing" => Some(LeadListStatus::Processing),
            "completed" => Some(LeadListStatus::Completed),
            "failed" => Some(LeadListStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewLeadList {
    pub name: String,
    pub source_url: String,
}

/// Wire payload announcing one dispatch attempt. One is published per
/// (re)dispatch; the correlation id binds it to exactly one worker run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadListCreatedMsg {
    pub lead_list_id: Uuid,
    pub correlation_id: Uuid,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

impl LeadListCreatedMsg {
    pub fn for_dispatch(lead_list: &LeadList) -> Self {
        Self {
            lead_list_id: lead_list.id,
            correlation_id: lead_list.correlation_id,
            source_url: lead_list.source_url.clone(),
            created_at: lead_list.created_at,
        }
    }
}
