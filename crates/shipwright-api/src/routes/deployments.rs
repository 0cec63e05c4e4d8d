//! Deployment endpoints: history and manual triggering.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shipwright_core::ResourceId;
use shipwright_db::{AuditStore, ProjectStore};

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_deployments))
        .route("/trigger", post(trigger))
        .route("/{id}", get(get_deployment))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

async fn list_deployments(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let deployments = state
        .store
        .list_deployments(query.limit.unwrap_or(50).clamp(1, 500))
        .await?;
    Ok(Json(json!({ "success": true, "deployments": deployments })))
}

async fn get_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let deployment = state.store.get_deployment(ResourceId::from_uuid(id)).await?;
    Ok(Json(json!({ "success": true, "deployment": deployment })))
}

#[derive(Debug, Deserialize)]
struct TriggerRequest {
    project_id: Uuid,
    branch: String,
    /// Commit recorded on the job; the deployment itself syncs the branch
    /// head.
    commit_sha: Option<String>,
}

/// Queue a deployment without a webhook, e.g. to re-run a failed push.
async fn trigger(
    State(state): State<AppState>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<Value>, ApiError> {
    let project = state
        .projects
        .get(ResourceId::from_uuid(request.project_id))
        .await?;

    let commit_sha = request.commit_sha.as_deref().unwrap_or("HEAD");
    let job_id = state
        .scheduler
        .enqueue(&project, commit_sha, &request.branch, None)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Deployment queued",
        "jobId": job_id,
    })))
}
