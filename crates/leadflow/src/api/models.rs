use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lead_lists::{LeadList, NewLeadList};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadListRequest {
    pub name: String,
    pub source_url: String,
}

impl From<LeadListRequest> for NewLeadList {
    fn from(req: LeadListRequest) -> Self {
        NewLeadList {
            name: req.name,
            source_url: req.source_url,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadListResponse {
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

impl From<LeadList> for LeadListResponse {
    fn from(l: LeadList) -> Self {
        Self {
            id: l.id,
            name: l.name,
            source_url: l.source_url,
            status: l.status,
            processed_count: l.processed_count,
            error_message: l.error_message,
            correlation_id: l.correlation_id,
            created_at: l.created_at,
            updated_at: l.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}
