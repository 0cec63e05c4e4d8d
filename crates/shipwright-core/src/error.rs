//! Error types for Shipwright.

use thiserror::Error;

/// Errors crossing the pipeline's trait seams (runner, sink).
#[derive(Debug, Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
