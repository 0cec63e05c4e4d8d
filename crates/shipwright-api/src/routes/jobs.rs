//! Pipeline job endpoints: history, queue state, cancellation.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shipwright_core::{JobStatus, ResourceId};
use shipwright_db::{AuditStore, JobFilter};

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/queue", get(queue_status))
        .route("/stats", get(statistics))
        .route("/{id}", get(get_job))
        .route("/{id}/cancel", post(cancel_job))
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    project_id: Option<Uuid>,
    status: Option<String>,
    branch: Option<String>,
    limit: Option<i64>,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<Value>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<JobStatus>())
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let jobs = state
        .store
        .list_jobs(
            JobFilter {
                project_id: query.project_id,
                status,
                branch: query.branch,
            },
            query.limit.unwrap_or(50).clamp(1, 500),
        )
        .await?;
    Ok(Json(json!({ "success": true, "jobs": jobs })))
}

async fn queue_status(State(state): State<AppState>) -> Json<Value> {
    let status = state.scheduler.queue_status().await;
    Json(json!({ "success": true, "queue": status }))
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    project_id: Option<Uuid>,
}

async fn statistics(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, ApiError> {
    let stats = state.store.job_statistics(query.project_id).await?;
    Ok(Json(json!({ "success": true, "statistics": stats })))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let job = state.store.get_job(ResourceId::from_uuid(id)).await?;
    Ok(Json(json!({ "success": true, "job": job })))
}

/// Cancel a queued job. Running jobs run to completion.
async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.scheduler.cancel(id).await?;
    Ok(Json(json!({ "success": true, "jobId": id })))
}
