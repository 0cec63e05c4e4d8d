//! Project operator endpoints.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use shipwright_db::ProjectStore;

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/{name}/backup", post(backup))
}

/// Archive a project's current workspace into a timestamped snapshot.
async fn backup(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let project = state
        .projects
        .find_by_name(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {}", name)))?;

    let archive = state.deployer.backup_workspace(&project).await?;
    Ok(Json(json!({
        "success": true,
        "archive": archive.display().to_string(),
    })))
}
