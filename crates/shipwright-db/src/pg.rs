//! PostgreSQL store implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use shipwright_core::{
    Deployment, GitProvider, JobStatus, NewDeployment, NewPipelineJob, NewWebhookEvent,
    PipelineJob, ProjectConfig, ResourceId, WebhookEvent,
};

use crate::store::{AuditStore, EventFilter, JobFilter, JobStatistics, ProjectStore};
use crate::{DbError, DbResult};

/// PostgreSQL implementation of [`AuditStore`].
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn event_from_row(row: &PgRow) -> DbResult<WebhookEvent> {
    let provider: String = row.try_get("provider")?;
    Ok(WebhookEvent {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        provider: provider.parse().map_err(DbError::Corrupt)?,
        event_type: row.try_get("event_type")?,
        delivery_id: row.try_get("delivery_id")?,
        repository: row.try_get("repository")?,
        branch: row.try_get("branch")?,
        commit_sha: row.try_get("commit_sha")?,
        commit_message: row.try_get("commit_message")?,
        author: row.try_get("author")?,
        payload: row.try_get("payload")?,
        received_at: row.try_get("received_at")?,
    })
}

fn job_from_row(row: &PgRow) -> DbResult<PipelineJob> {
    let status: String = row.try_get("status")?;
    Ok(PipelineJob {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        webhook_event_id: row.try_get("webhook_event_id")?,
        commit_sha: row.try_get("commit_sha")?,
        branch: row.try_get("branch")?,
        status: status.parse().map_err(DbError::Corrupt)?,
        queued_at: row.try_get("queued_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        deployment_id: row.try_get("deployment_id")?,
    })
}

fn deployment_from_row(row: &PgRow) -> DbResult<Deployment> {
    Ok(Deployment {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        success: row.try_get("success")?,
        error_message: row.try_get("error_message")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn record_event(&self, event: NewWebhookEvent) -> DbResult<WebhookEvent> {
        let id = Uuid::now_v7();
        let received_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO webhook_events (
                id, project_id, provider, event_type, delivery_id, repository,
                branch, commit_sha, commit_message, author, payload, received_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(id)
        .bind(event.project_id)
        .bind(event.provider.to_string())
        .bind(&event.event_type)
        .bind(&event.delivery_id)
        .bind(&event.repository)
        .bind(&event.branch)
        .bind(&event.commit_sha)
        .bind(&event.commit_message)
        .bind(&event.author)
        .bind(&event.payload)
        .bind(received_at)
        .execute(&self.pool)
        .await?;

        Ok(WebhookEvent {
            id,
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
            received_at,
        })
    }

    async fn find_event_by_delivery(
        &self,
        provider: GitProvider,
        delivery_id: &str,
    ) -> DbResult<Option<WebhookEvent>> {
        let row = sqlx::query(
            "SELECT * FROM webhook_events WHERE provider = $1 AND delivery_id = $2",
        )
        .bind(provider.to_string())
        .bind(delivery_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn list_events(&self, filter: EventFilter, limit: i64) -> DbResult<Vec<WebhookEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM webhook_events
            WHERE ($1::text IS NULL OR provider = $1)
              AND ($2::text IS NULL OR repository = $2)
              AND ($3::text IS NULL OR branch = $3)
            ORDER BY received_at DESC
            LIMIT $4
            "#,
        )
        .bind(filter.provider.map(|p| p.to_string()))
        .bind(filter.repository)
        .bind(filter.branch)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn create_job(&self, job: NewPipelineJob) -> DbResult<PipelineJob> {
        let id = Uuid::now_v7();
        let queued_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO pipeline_jobs (
                id, project_id, webhook_event_id, commit_sha, branch, status, queued_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(job.project_id)
        .bind(job.webhook_event_id)
        .bind(&job.commit_sha)
        .bind(&job.branch)
        .bind(JobStatus::Queued.to_string())
        .bind(queued_at)
        .execute(&self.pool)
        .await?;

        Ok(PipelineJob {
            id,
            project_id: job.project_id,
            webhook_event_id: job.webhook_event_id,
            commit_sha: job.commit_sha,
            branch: job.branch,
            status: JobStatus::Queued,
            queued_at,
            started_at: None,
            completed_at: None,
            deployment_id: None,
        })
    }

    async fn get_job(&self, id: ResourceId) -> DbResult<PipelineJob> {
        let row = sqlx::query("SELECT * FROM pipeline_jobs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        job_from_row(&row)
    }

    async fn mark_job_running(&self, id: ResourceId, started_at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE pipeline_jobs SET status = 'running', started_at = $2 \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id.as_uuid())
        .bind(started_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::IllegalTransition(format!(
                "job {} is not queued",
                id
            )));
        }
        Ok(())
    }

    async fn mark_job_finished(
        &self,
        id: ResourceId,
        status: JobStatus,
        deployment_id: Option<Uuid>,
        completed_at: DateTime<Utc>,
    ) -> DbResult<()> {
        if !JobStatus::Running.can_transition_to(status) {
            return Err(DbError::IllegalTransition(format!(
                "running -> {} is not a legal transition",
                status
            )));
        }
        let result = sqlx::query(
            "UPDATE pipeline_jobs SET status = $2, deployment_id = $3, completed_at = $4 \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id.as_uuid())
        .bind(status.to_string())
        .bind(deployment_id)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::IllegalTransition(format!(
                "job {} is not running",
                id
            )));
        }
        Ok(())
    }

    async fn mark_job_cancelled(&self, id: ResourceId) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE pipeline_jobs SET status = 'cancelled' WHERE id = $1 AND status = 'queued'",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::IllegalTransition(format!(
                "job {} is not queued",
                id
            )));
        }
        Ok(())
    }

    async fn list_jobs(&self, filter: JobFilter, limit: i64) -> DbResult<Vec<PipelineJob>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM pipeline_jobs
            WHERE ($1::uuid IS NULL OR project_id = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR branch = $3)
            ORDER BY queued_at DESC
            LIMIT $4
            "#,
        )
        .bind(filter.project_id)
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.branch)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn list_queued_jobs(&self) -> DbResult<Vec<PipelineJob>> {
        let rows = sqlx::query(
            "SELECT * FROM pipeline_jobs WHERE status = 'queued' ORDER BY queued_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn fail_interrupted_jobs(&self) -> DbResult<Vec<PipelineJob>> {
        let rows = sqlx::query(
            "UPDATE pipeline_jobs SET status = 'failed', completed_at = NOW() \
             WHERE status = 'running' RETURNING *",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn job_statistics(&self, project_id: Option<Uuid>) -> DbResult<JobStatistics> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'queued') AS queued,
                COUNT(*) FILTER (WHERE status = 'running') AS running,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled
            FROM pipeline_jobs
            WHERE ($1::uuid IS NULL OR project_id = $1)
            "#,
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(JobStatistics {
            total: row.try_get("total")?,
            queued: row.try_get("queued")?,
            running: row.try_get("running")?,
            completed: row.try_get("completed")?,
            failed: row.try_get("failed")?,
            cancelled: row.try_get("cancelled")?,
        })
    }

    async fn record_deployment(&self, deployment: NewDeployment) -> DbResult<Deployment> {
        let id = Uuid::now_v7();
        sqlx::query(
            r#"
            INSERT INTO deployments (id, job_id, success, error_message, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(deployment.job_id)
        .bind(deployment.success)
        .bind(&deployment.error_message)
        .bind(deployment.started_at)
        .bind(deployment.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(Deployment {
            id,
            job_id: deployment.job_id,
            success: deployment.success,
            error_message: deployment.error_message,
            started_at: deployment.started_at,
            completed_at: deployment.completed_at,
        })
    }

    async fn get_deployment(&self, id: ResourceId) -> DbResult<Deployment> {
        let row = sqlx::query("SELECT * FROM deployments WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("deployment {}", id)))?;
        deployment_from_row(&row)
    }

    async fn list_deployments(&self, limit: i64) -> DbResult<Vec<Deployment>> {
        let rows = sqlx::query("SELECT * FROM deployments ORDER BY started_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(deployment_from_row).collect()
    }
}

/// PostgreSQL implementation of [`ProjectStore`].
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn project_from_row(row: &PgRow) -> DbResult<ProjectConfig> {
    let provider: String = row.try_get("provider")?;
    let branch_filter: String = row.try_get("branch_filter")?;
    Ok(ProjectConfig {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        provider: provider.parse().map_err(DbError::Corrupt)?,
        repository: row.try_get("repository")?,
        repo_url: row.try_get("repo_url")?,
        webhook_secret: row.try_get("webhook_secret")?,
        branch_filter: ProjectConfig::parse_branch_filter(&branch_filter),
        install_command: row.try_get("install_command")?,
        build_command: row.try_get("build_command")?,
        enabled: row.try_get("enabled")?,
    })
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn get(&self, id: ResourceId) -> DbResult<ProjectConfig> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("project {}", id)))?;
        project_from_row(&row)
    }

    async fn find_by_repository(
        &self,
        provider: GitProvider,
        full_name: &str,
    ) -> DbResult<Option<ProjectConfig>> {
        let row = sqlx::query("SELECT * FROM projects WHERE provider = $1 AND repository = $2")
            .bind(provider.to_string())
            .bind(full_name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn find_by_name(&self, name: &str) -> DbResult<Option<ProjectConfig>> {
        let row = sqlx::query("SELECT * FROM projects WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }
}
