//! Webhook endpoints for Git providers.
//!
//! These routes are called by GitHub/GitLab, not by operators; they carry
//! no session auth and are secured by signature/token verification inside
//! the gateway. The response returns as soon as the event is recorded and
//! any job is queued, so slow deployments never make the sender time out.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shipwright_core::GitProvider;

use crate::error::ApiError;
use crate::services::gateway::WebhookOutcome;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{provider}", post(receive))
        .route("/{provider}/{project_id}", post(receive_with_project))
}

/// Handle a webhook, resolving the project from the payload repository.
async fn receive(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    process(state, &provider, None, headers, body).await
}

/// Handle a webhook addressed to an explicit project.
async fn receive_with_project(
    State(state): State<AppState>,
    Path((provider, project_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    process(state, &provider, Some(project_id), headers, body).await
}

async fn process(
    state: AppState,
    provider: &str,
    project_id: Option<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let provider: GitProvider = provider
        .parse()
        .map_err(|e: String| ApiError::BadRequest(e))?;

    info!(provider = %provider, bytes = body.len(), "Received webhook");

    let outcome: WebhookOutcome = state
        .gateway
        .process(provider, project_id, &headers, &body)
        .await?;

    Ok(Json(json!({
        "success": true,
        "eventId": outcome.event_id,
        "shouldDeploy": outcome.should_deploy,
        "jobId": outcome.job_id,
    })))
}
