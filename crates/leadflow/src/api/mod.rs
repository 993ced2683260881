use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::models::{LeadListRequest, LeadListResponse, PagedResult};
use crate::error::Error;
use crate::lead_lists::LeadListService;

pub mod models;

#[derive(Clone)]
pub struct ApiState {
    pub service: LeadListService,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/lead-lists", get(list_lead_lists).post(create_lead_list))
        .route(
            "/lead-lists/:id",
            get(get_lead_list)
                .put(update_lead_list)
                .delete(delete_lead_list),
        )
        .route("/lead-lists/:id/reprocess", post(reprocess_lead_list))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn map_err(e: Error) -> ApiError {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::StateConflict { .. } => StatusCode::CONFLICT,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Launch(_) => StatusCode::BAD_GATEWAY,
        Error::Db(_) | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub q: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

pub async fn list_lead_lists(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PagedResult<LeadListResponse>>, ApiError> {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(10);

    let (items, total) = state
        .service
        .list(query.status.as_deref(), query.q.as_deref(), page, page_size)
        .await
        .map_err(map_err)?;

    Ok(Json(PagedResult {
        items: items.into_iter().map(LeadListResponse::from).collect(),
        total,
        page: page.max(1),
        page_size: page_size.clamp(1, 100),
    }))
}

pub async fn get_lead_list(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeadListResponse>, ApiError> {
    let lead_list = state.service.get(id).await.map_err(map_err)?;
    Ok(Json(lead_list.into()))
}

pub async fn create_lead_list(
    State(state): State<ApiState>,
    Json(body): Json<LeadListRequest>,
) -> Result<(StatusCode, Json<LeadListResponse>), ApiError> {
    let lead_list = state.service.create(body.into()).await.map_err(map_err)?;
    Ok((StatusCode::CREATED, Json(lead_list.into())))
}

pub async fn update_lead_list(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(body): Json<LeadListRequest>,
) -> Result<Json<LeadListResponse>, ApiError> {
    let lead_list = state
        .service
        .update(id, body.into())
        .await
        .map_err(map_err)?;
    Ok(Json(lead_list.into()))
}

pub async fn delete_lead_list(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.delete(id).await.map_err(map_err)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reprocess_lead_list(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeadListResponse>, ApiError> {
    let lead_list = state.service.reprocess(id).await.map_err(map_err)?;
    Ok(Json(lead_list.into()))
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

pub async fn metrics(State(state): State<ApiState>) -> Result<Json<MetricsResponse>, ApiError> {
    let (pending, processing, completed, failed) =
        state.service.metrics_snapshot().await.map_err(map_err)?;

    Ok(Json(MetricsResponse {
        pending,
        processing,
        completed,
        failed,
    }))
}

pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
