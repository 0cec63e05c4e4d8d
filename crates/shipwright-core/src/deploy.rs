//! Deployment records and the runner trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::PipelineJob;
use crate::project::ProjectConfig;
use crate::Result;

/// The recorded outcome of executing the sync/build sequence for one job.
/// Written at most once per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub job_id: Uuid,
    pub success: bool,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Fields for recording a new deployment.
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub job_id: Uuid,
    pub success: bool,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Trait for deployment runners.
///
/// A runner executes the full deployment sequence for one admitted job and
/// records the outcome. The returned `Deployment` carries the success flag
/// and error message; `Err` is reserved for faults that prevented recording
/// an outcome at all.
#[async_trait]
pub trait DeployRunner: Send + Sync {
    async fn deploy(&self, job: PipelineJob, project: ProjectConfig) -> Result<Deployment>;
}
