//! Notification sink trait and alert types.
//!
//! The pipeline only produces alerts; delivery (email, chat, ...) is an
//! external collaborator behind [`NotificationSink`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::Result;

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// An outbound notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Alert category, e.g. `deployment`.
    pub kind: String,
    pub level: AlertLevel,
    pub message: String,
    pub metadata: serde_json::Value,
}

/// Trait for notification delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, alert: Alert) -> Result<()>;
}

/// Sink that emits alerts as structured log events. Used when no external
/// delivery is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, alert: Alert) -> Result<()> {
        match alert.level {
            AlertLevel::Info => {
                info!(kind = %alert.kind, metadata = %alert.metadata, "{}", alert.message)
            }
            AlertLevel::Warning => {
                warn!(kind = %alert.kind, metadata = %alert.metadata, "{}", alert.message)
            }
            AlertLevel::Critical => {
                error!(kind = %alert.kind, metadata = %alert.metadata, "{}", alert.message)
            }
        }
        Ok(())
    }
}
