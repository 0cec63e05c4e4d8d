//! API error handling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::services::gateway::GatewayError;
use shipwright_db::DbError;
use shipwright_deployer::DeployError;
use shipwright_scheduler::SchedulerError;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "success": false,
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => ApiError::NotFound(msg),
            DbError::Duplicate(msg) => ApiError::Conflict(msg),
            DbError::IllegalTransition(msg) => ApiError::Conflict(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::JobRunning(_) | SchedulerError::JobNotQueued(_) => {
                ApiError::Conflict(err.to_string())
            }
            SchedulerError::Store(e) => e.into(),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::UnknownProject => ApiError::NotFound("unknown project".to_string()),
            // generic message: never reveal whether the secret itself matched
            GatewayError::InvalidSignature => {
                ApiError::Unauthorized("webhook validation failed".to_string())
            }
            GatewayError::InvalidPayload(msg) => ApiError::BadRequest(msg),
            GatewayError::Store(e) => e.into(),
            GatewayError::Scheduler(e) => e.into(),
        }
    }
}

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        match err {
            DeployError::WorkspaceNotFound(name) => {
                ApiError::NotFound(format!("no workspace for project {}", name))
            }
            DeployError::InvalidProjectName(_) => ApiError::BadRequest(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
