//! HTTP API server for the Shipwright deployment pipeline.
//!
//! Exposes the webhook endpoints and the operator surface (job history,
//! cancellation, manual triggers, backups).

pub mod config;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ServerConfig;
pub use state::AppState;
