use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::lead_lists::LeadListCreatedMsg;

/// A body that cannot be decoded into the expected message shape.
/// Callers treat this as a poison message and reject it permanently.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid message body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message body is not a JSON object")]
    NotAnObject,

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid field '{field}': {source}")]
    InvalidField {
        field: &'static str,
        source: serde_json::Error,
    },
}

/// Decode a published lead-list-created body.
///
/// Field names are matched case-insensitively: the producing and consuming
/// components have drifted between `leadListId`, `LeadListId` and friends,
/// and the protocol tolerates all of them.
pub fn decode_created_msg(body: &str) -> Result<LeadListCreatedMsg, DecodeError> {
    let value: Value = serde_json::from_str(body)?;
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

    Ok(LeadListCreatedMsg {
        lead_list_id: field_ci::<Uuid>(obj, "leadListId")?,
        correlation_id: field_ci::<Uuid>(obj, "correlationId")?,
        source_url: field_ci::<String>(obj, "sourceUrl")?,
        created_at: field_ci::<DateTime<Utc>>(obj, "createdAt")?,
    })
}

fn field_ci<T: DeserializeOwned>(
    obj: &Map<String, Value>,
    name: &'static str,
) -> Result<T, DecodeError> {
    let value = obj
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
        .ok_or(DecodeError::MissingField(name))?;

    serde_json::from_value(value.clone())
        .map_err(|source| DecodeError::InvalidField { field: name, source })
}
