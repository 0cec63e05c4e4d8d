//! In-memory store implementations.
//!
//! Used by tests and available for local development without a database.
//! Semantics match the PostgreSQL implementations, including transition
//! enforcement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use shipwright_core::{
    Deployment, GitProvider, JobStatus, NewDeployment, NewPipelineJob, NewWebhookEvent,
    PipelineJob, ProjectConfig, ResourceId, WebhookEvent,
};

use crate::store::{AuditStore, EventFilter, JobFilter, JobStatistics, ProjectStore};
use crate::{DbError, DbResult};

/// In-memory implementation of [`AuditStore`].
#[derive(Default)]
pub struct MemoryAuditStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    events: Vec<WebhookEvent>,
    jobs: Vec<PipelineJob>,
    deployments: Vec<Deployment>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn record_event(&self, event: NewWebhookEvent) -> DbResult<WebhookEvent> {
        let mut inner = self.inner.lock().await;
        let stored = WebhookEvent {
            id: Uuid::now_v7(),
            project_id: event.project_id,
            provider: event.provider,
            event_type: event.event_type,
            delivery_id: event.delivery_id,
            repository: event.repository,
            branch: event.branch,
            commit_sha: event.commit_sha,
            commit_message: event.commit_message,
            author: event.author,
            payload: event.payload,
            received_at: Utc::now(),
        };
        inner.events.push(stored.clone());
        Ok(stored)
    }

    async fn find_event_by_delivery(
        &self,
        provider: GitProvider,
        delivery_id: &str,
    ) -> DbResult<Option<WebhookEvent>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .iter()
            .find(|e| e.provider == provider && e.delivery_id.as_deref() == Some(delivery_id))
            .cloned())
    }

    async fn list_events(&self, filter: EventFilter, limit: i64) -> DbResult<Vec<WebhookEvent>> {
        let inner = self.inner.lock().await;
        let mut events: Vec<_> = inner
            .events
            .iter()
            .filter(|e| filter.provider.is_none_or(|p| e.provider == p))
            .filter(|e| {
                filter
                    .repository
                    .as_deref()
                    .is_none_or(|r| e.repository == r)
            })
            .filter(|e| filter.branch.as_deref().is_none_or(|b| e.branch == b))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }

    async fn create_job(&self, job: NewPipelineJob) -> DbResult<PipelineJob> {
        let mut inner = self.inner.lock().await;
        let stored = PipelineJob {
            id: Uuid::now_v7(),
            project_id: job.project_id,
            webhook_event_id: job.webhook_event_id,
            commit_sha: job.commit_sha,
            branch: job.branch,
            status: JobStatus::Queued,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            deployment_id: None,
        };
        inner.jobs.push(stored.clone());
        Ok(stored)
    }

    async fn get_job(&self, id: ResourceId) -> DbResult<PipelineJob> {
        let inner = self.inner.lock().await;
        inner
            .jobs
            .iter()
            .find(|j| j.id == *id.as_uuid())
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))
    }

    async fn mark_job_running(&self, id: ResourceId, started_at: DateTime<Utc>) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == *id.as_uuid())
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        if job.status != JobStatus::Queued {
            return Err(DbError::IllegalTransition(format!(
                "job {} is not queued",
                id
            )));
        }
        job.status = JobStatus::Running;
        job.started_at = Some(started_at);
        Ok(())
    }

    async fn mark_job_finished(
        &self,
        id: ResourceId,
        status: JobStatus,
        deployment_id: Option<Uuid>,
        completed_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == *id.as_uuid())
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        if !job.status.can_transition_to(status) {
            return Err(DbError::IllegalTransition(format!(
                "{} -> {} is not a legal transition",
                job.status, status
            )));
        }
        job.status = status;
        job.deployment_id = deployment_id;
        job.completed_at = Some(completed_at);
        Ok(())
    }

    async fn mark_job_cancelled(&self, id: ResourceId) -> DbResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == *id.as_uuid())
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        if job.status != JobStatus::Queued {
            return Err(DbError::IllegalTransition(format!(
                "job {} is not queued",
                id
            )));
        }
        job.status = JobStatus::Cancelled;
        Ok(())
    }

    async fn list_jobs(&self, filter: JobFilter, limit: i64) -> DbResult<Vec<PipelineJob>> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<_> = inner
            .jobs
            .iter()
            .filter(|j| filter.project_id.is_none_or(|p| j.project_id == p))
            .filter(|j| filter.status.is_none_or(|s| j.status == s))
            .filter(|j| filter.branch.as_deref().is_none_or(|b| j.branch == b))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn list_queued_jobs(&self) -> DbResult<Vec<PipelineJob>> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<_> = inner
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.queued_at.cmp(&b.queued_at));
        Ok(jobs)
    }

    async fn fail_interrupted_jobs(&self) -> DbResult<Vec<PipelineJob>> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut failed = Vec::new();
        for job in inner
            .jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Running)
        {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            failed.push(job.clone());
        }
        Ok(failed)
    }

    async fn job_statistics(&self, project_id: Option<Uuid>) -> DbResult<JobStatistics> {
        let inner = self.inner.lock().await;
        let mut stats = JobStatistics::default();
        for job in inner
            .jobs
            .iter()
            .filter(|j| project_id.is_none_or(|p| j.project_id == p))
        {
            stats.total += 1;
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    async fn record_deployment(&self, deployment: NewDeployment) -> DbResult<Deployment> {
        let mut inner = self.inner.lock().await;
        if inner.deployments.iter().any(|d| d.job_id == deployment.job_id) {
            return Err(DbError::Duplicate(format!(
                "deployment for job {}",
                deployment.job_id
            )));
        }
        let stored = Deployment {
            id: Uuid::now_v7(),
            job_id: deployment.job_id,
            success: deployment.success,
            error_message: deployment.error_message,
            started_at: deployment.started_at,
            completed_at: deployment.completed_at,
        };
        inner.deployments.push(stored.clone());
        Ok(stored)
    }

    async fn get_deployment(&self, id: ResourceId) -> DbResult<Deployment> {
        let inner = self.inner.lock().await;
        inner
            .deployments
            .iter()
            .find(|d| d.id == *id.as_uuid())
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("deployment {}", id)))
    }

    async fn list_deployments(&self, limit: i64) -> DbResult<Vec<Deployment>> {
        let inner = self.inner.lock().await;
        let mut deployments = inner.deployments.clone();
        deployments.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        deployments.truncate(limit.max(0) as usize);
        Ok(deployments)
    }
}

/// In-memory implementation of [`ProjectStore`], seeded at construction.
#[derive(Default)]
pub struct MemoryProjectStore {
    projects: Vec<ProjectConfig>,
}

impl MemoryProjectStore {
    pub fn new(projects: Vec<ProjectConfig>) -> Self {
        Self { projects }
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn get(&self, id: ResourceId) -> DbResult<ProjectConfig> {
        self.projects
            .iter()
            .find(|p| p.id == *id.as_uuid())
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("project {}", id)))
    }

    async fn find_by_repository(
        &self,
        provider: GitProvider,
        full_name: &str,
    ) -> DbResult<Option<ProjectConfig>> {
        Ok(self
            .projects
            .iter()
            .find(|p| p.provider == provider && p.repository == full_name)
            .cloned())
    }

    async fn find_by_name(&self, name: &str) -> DbResult<Option<ProjectConfig>> {
        Ok(self.projects.iter().find(|p| p.name == name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job() -> NewPipelineJob {
        NewPipelineJob {
            project_id: Uuid::now_v7(),
            webhook_event_id: None,
            commit_sha: "abc123".to_string(),
            branch: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let store = MemoryAuditStore::new();
        let job = store.create_job(new_job()).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let id = ResourceId::from_uuid(job.id);
        store.mark_job_running(id, Utc::now()).await.unwrap();
        store
            .mark_job_finished(id, JobStatus::Completed, None, Utc::now())
            .await
            .unwrap();

        let job = store.get_job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_illegal_transitions_rejected() {
        let store = MemoryAuditStore::new();
        let job = store.create_job(new_job()).await.unwrap();
        let id = ResourceId::from_uuid(job.id);

        // finish before running
        assert!(matches!(
            store
                .mark_job_finished(id, JobStatus::Completed, None, Utc::now())
                .await,
            Err(DbError::IllegalTransition(_))
        ));

        store.mark_job_running(id, Utc::now()).await.unwrap();
        // cancel after admission
        assert!(matches!(
            store.mark_job_cancelled(id).await,
            Err(DbError::IllegalTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_one_deployment_per_job() {
        let store = MemoryAuditStore::new();
        let job = store.create_job(new_job()).await.unwrap();
        let dep = NewDeployment {
            job_id: job.id,
            success: true,
            error_message: None,
            started_at: Utc::now(),
            completed_at: Utc::now(),
        };
        store.record_deployment(dep.clone()).await.unwrap();
        assert!(matches!(
            store.record_deployment(dep).await,
            Err(DbError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_interrupted_jobs() {
        let store = MemoryAuditStore::new();
        let running = store.create_job(new_job()).await.unwrap();
        store
            .mark_job_running(ResourceId::from_uuid(running.id), Utc::now())
            .await
            .unwrap();
        let queued = store.create_job(new_job()).await.unwrap();

        let failed = store.fail_interrupted_jobs().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, running.id);

        let queued = store.get_job(ResourceId::from_uuid(queued.id)).await.unwrap();
        assert_eq!(queued.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_event_dedup_lookup() {
        let store = MemoryAuditStore::new();
        let event = NewWebhookEvent {
            project_id: None,
            provider: GitProvider::Github,
            event_type: "push".to_string(),
            delivery_id: Some("d-1".to_string()),
            repository: "acme/site".to_string(),
            branch: "main".to_string(),
            commit_sha: "abc".to_string(),
            commit_message: "msg".to_string(),
            author: "jane".to_string(),
            payload: serde_json::json!({}),
        };
        let stored = store.record_event(event).await.unwrap();

        let found = store
            .find_event_by_delivery(GitProvider::Github, "d-1")
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, stored.id);
        assert!(store
            .find_event_by_delivery(GitProvider::Gitlab, "d-1")
            .await
            .unwrap()
            .is_none());
    }
}
