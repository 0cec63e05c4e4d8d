//! Store traits consumed by the pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use shipwright_core::{
    Deployment, GitProvider, JobStatus, NewDeployment, NewPipelineJob, NewWebhookEvent,
    PipelineJob, ProjectConfig, ResourceId, WebhookEvent,
};

use crate::DbResult;

/// Filter for webhook event listings.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub provider: Option<GitProvider>,
    pub repository: Option<String>,
    pub branch: Option<String>,
}

/// Filter for pipeline job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<JobStatus>,
    pub branch: Option<String>,
}

/// Aggregate counts over pipeline jobs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStatistics {
    pub total: i64,
    pub queued: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

/// Durable record of webhook events, jobs, and deployments.
///
/// Every scheduler state transition is persisted through this trait before
/// the in-memory view is treated as authoritative. Transition methods
/// enforce the job status machine: an update whose precondition status no
/// longer holds fails with `DbError::IllegalTransition`.
#[async_trait]
pub trait AuditStore: Send + Sync {
    // Webhook events
    async fn record_event(&self, event: NewWebhookEvent) -> DbResult<WebhookEvent>;
    async fn find_event_by_delivery(
        &self,
        provider: GitProvider,
        delivery_id: &str,
    ) -> DbResult<Option<WebhookEvent>>;
    async fn list_events(&self, filter: EventFilter, limit: i64) -> DbResult<Vec<WebhookEvent>>;

    // Pipeline jobs
    async fn create_job(&self, job: NewPipelineJob) -> DbResult<PipelineJob>;
    async fn get_job(&self, id: ResourceId) -> DbResult<PipelineJob>;
    async fn mark_job_running(&self, id: ResourceId, started_at: DateTime<Utc>) -> DbResult<()>;
    async fn mark_job_finished(
        &self,
        id: ResourceId,
        status: JobStatus,
        deployment_id: Option<Uuid>,
        completed_at: DateTime<Utc>,
    ) -> DbResult<()>;
    async fn mark_job_cancelled(&self, id: ResourceId) -> DbResult<()>;
    async fn list_jobs(&self, filter: JobFilter, limit: i64) -> DbResult<Vec<PipelineJob>>;
    /// Jobs persisted as queued, oldest first. Used for restart recovery.
    async fn list_queued_jobs(&self) -> DbResult<Vec<PipelineJob>>;
    /// Mark every job persisted as running as failed, returning the jobs
    /// affected. Used for restart recovery; their true outcome is unknown.
    async fn fail_interrupted_jobs(&self) -> DbResult<Vec<PipelineJob>>;
    async fn job_statistics(&self, project_id: Option<Uuid>) -> DbResult<JobStatistics>;

    // Deployments
    async fn record_deployment(&self, deployment: NewDeployment) -> DbResult<Deployment>;
    async fn get_deployment(&self, id: ResourceId) -> DbResult<Deployment>;
    async fn list_deployments(&self, limit: i64) -> DbResult<Vec<Deployment>>;
}

/// Read-only lookup of project configuration.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get(&self, id: ResourceId) -> DbResult<ProjectConfig>;
    async fn find_by_repository(
        &self,
        provider: GitProvider,
        full_name: &str,
    ) -> DbResult<Option<ProjectConfig>>;
    async fn find_by_name(&self, name: &str) -> DbResult<Option<ProjectConfig>>;
}
