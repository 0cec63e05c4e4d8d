//! API routes.

pub mod deployments;
pub mod events;
pub mod health;
pub mod jobs;
pub mod projects;
pub mod webhooks;

use axum::Router;

use crate::AppState;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router())
        .nest("/webhooks", webhooks::router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/deployments", deployments::router())
        .nest("/events", events::router())
        .nest("/projects", projects::router())
}
