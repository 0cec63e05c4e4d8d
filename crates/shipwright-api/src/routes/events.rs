//! Webhook event history endpoints.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use shipwright_core::GitProvider;
use shipwright_db::{AuditStore, EventFilter};

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_events))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    provider: Option<String>,
    repository: Option<String>,
    branch: Option<String>,
    limit: Option<i64>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Value>, ApiError> {
    let provider = query
        .provider
        .as_deref()
        .map(|p| p.parse::<GitProvider>())
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let events = state
        .store
        .list_events(
            EventFilter {
                provider,
                repository: query.repository,
                branch: query.branch,
            },
            query.limit.unwrap_or(50).clamp(1, 500),
        )
        .await?;
    Ok(Json(json!({ "success": true, "events": events })))
}
