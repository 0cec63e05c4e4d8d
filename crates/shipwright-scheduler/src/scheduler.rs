//! The pipeline scheduler: FIFO queue with bounded-concurrency admission.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use shipwright_core::{
    Alert, AlertLevel, DeployRunner, Deployment, JobStatus, NewPipelineJob, NotificationSink,
    PipelineJob, ProjectConfig, ResourceId,
};
use shipwright_db::{AuditStore, DbError, ProjectStore};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of jobs in running state at any instant.
    pub max_concurrent: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_concurrent: 3 }
    }
}

/// Errors from scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job {0} is running and cannot be cancelled")]
    JobRunning(Uuid),

    #[error("job {0} is not queued")]
    JobNotQueued(Uuid),

    #[error(transparent)]
    Store(#[from] DbError),
}

/// Summary of a job currently holding a concurrency slot.
#[derive(Debug, Clone, Serialize)]
pub struct RunningJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub project_name: String,
    pub commit_sha: String,
    pub branch: String,
    pub started_at: DateTime<Utc>,
}

/// Snapshot of queue and running-set state.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub queued: usize,
    pub running: usize,
    pub max_concurrent: usize,
    pub running_jobs: Vec<RunningJob>,
}

/// Result of startup recovery.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    /// Jobs persisted as running at startup, marked failed.
    pub failed: usize,
    /// Jobs persisted as queued at startup, re-enqueued.
    pub requeued: usize,
}

struct QueuedEntry {
    job: PipelineJob,
    project: ProjectConfig,
}

/// FIFO scheduler with a bounded running set.
///
/// Jobs are admitted into running in strict arrival order, never more than
/// `max_concurrent` at once. Admission waits on a semaphore sized to the
/// cap, so a freed slot is taken up immediately. Completion order is not
/// guaranteed. The queue itself is unbounded.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    config: SchedulerConfig,
    store: Arc<dyn AuditStore>,
    sink: Arc<dyn NotificationSink>,
    runner: Arc<dyn DeployRunner>,
    queue: Mutex<VecDeque<QueuedEntry>>,
    queue_wakeup: Notify,
    slots: Arc<Semaphore>,
    running: Mutex<HashMap<Uuid, RunningJob>>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn AuditStore>,
        sink: Arc<dyn NotificationSink>,
        runner: Arc<dyn DeployRunner>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                sink,
                runner,
                queue: Mutex::new(VecDeque::new()),
                queue_wakeup: Notify::new(),
                slots,
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Persist a new queued job and append it to the queue tail.
    ///
    /// Returns the job id immediately; the caller never waits on the
    /// deployment itself.
    pub async fn enqueue(
        &self,
        project: &ProjectConfig,
        commit_sha: &str,
        branch: &str,
        webhook_event_id: Option<Uuid>,
    ) -> Result<Uuid, SchedulerError> {
        let job = self
            .inner
            .store
            .create_job(NewPipelineJob {
                project_id: project.id,
                webhook_event_id,
                commit_sha: commit_sha.to_string(),
                branch: branch.to_string(),
            })
            .await?;
        let job_id = job.id;

        info!(
            job_id = %job_id,
            project = %project.name,
            branch = %branch,
            sha = %commit_sha,
            "Job queued"
        );

        self.inner.queue.lock().await.push_back(QueuedEntry {
            job,
            project: project.clone(),
        });
        self.inner.queue_wakeup.notify_one();
        Ok(job_id)
    }

    /// Run the scheduling loop. Single coordinating loop, not re-entrant;
    /// runs until the owning task is dropped.
    pub async fn run(&self) {
        info!(
            max_concurrent = self.inner.config.max_concurrent,
            "Pipeline scheduler started"
        );
        loop {
            // Hold a free slot before touching the queue, so a job stays
            // cancellable until the instant it is admitted.
            let Ok(permit) = self.inner.slots.clone().acquire_owned().await else {
                // Semaphore closed; nothing left to admit.
                return;
            };
            let entry = self.next_entry().await;
            self.admit(entry, permit).await;
        }
    }

    /// Pop the queue head, waiting for work when the queue is empty.
    async fn next_entry(&self) -> QueuedEntry {
        loop {
            if let Some(entry) = self.inner.queue.lock().await.pop_front() {
                return entry;
            }
            self.inner.queue_wakeup.notified().await;
        }
    }

    /// Mark a job running and launch its deployment as an independent task.
    async fn admit(&self, entry: QueuedEntry, permit: OwnedSemaphorePermit) {
        let started_at = Utc::now();
        let job_id = entry.job.id;

        if let Err(e) = self
            .inner
            .store
            .mark_job_running(ResourceId::from_uuid(job_id), started_at)
            .await
        {
            error!(job_id = %job_id, error = %e, "Failed to admit job, dropping it");
            return;
        }

        self.inner.running.lock().await.insert(
            job_id,
            RunningJob {
                id: job_id,
                project_id: entry.project.id,
                project_name: entry.project.name.clone(),
                commit_sha: entry.job.commit_sha.clone(),
                branch: entry.job.branch.clone(),
                started_at,
            },
        );

        info!(job_id = %job_id, project = %entry.project.name, "Job admitted");

        let inner = self.inner.clone();
        tokio::spawn(async move {
            Inner::execute(inner, entry, started_at, permit).await;
        });
    }

    /// Cancel a job still waiting in the queue.
    ///
    /// A running job must run to completion; only queued jobs can be
    /// cancelled.
    pub async fn cancel(&self, job_id: Uuid) -> Result<(), SchedulerError> {
        let removed = {
            let mut queue = self.inner.queue.lock().await;
            match queue.iter().position(|e| e.job.id == job_id) {
                Some(pos) => {
                    queue.remove(pos);
                    true
                }
                None => false,
            }
        };

        if removed {
            self.inner
                .store
                .mark_job_cancelled(ResourceId::from_uuid(job_id))
                .await?;
            info!(job_id = %job_id, "Job cancelled");
            return Ok(());
        }

        if self.inner.running.lock().await.contains_key(&job_id) {
            return Err(SchedulerError::JobRunning(job_id));
        }
        Err(SchedulerError::JobNotQueued(job_id))
    }

    /// Snapshot the queue length and running set.
    pub async fn queue_status(&self) -> QueueStatus {
        let queued = self.inner.queue.lock().await.len();
        let running: Vec<RunningJob> = self.inner.running.lock().await.values().cloned().collect();
        QueueStatus {
            queued,
            running: running.len(),
            max_concurrent: self.inner.config.max_concurrent,
            running_jobs: running,
        }
    }

    /// Reconcile persisted job state after a restart.
    ///
    /// Jobs left running have an unknown true outcome and are marked failed
    /// pending manual verification; persisted queued jobs are re-enqueued
    /// in arrival order. Queued jobs whose project no longer resolves (or
    /// is disabled) are cancelled.
    pub async fn recover(&self, projects: &dyn ProjectStore) -> Result<RecoveryReport, SchedulerError> {
        let mut report = RecoveryReport::default();

        let interrupted = self.inner.store.fail_interrupted_jobs().await?;
        for job in &interrupted {
            warn!(job_id = %job.id, "Job was running at shutdown, marked failed");
            let alert = Alert {
                kind: "recovery".to_string(),
                level: AlertLevel::Warning,
                message: format!(
                    "Job {} was interrupted by a restart; outcome unknown, marked failed",
                    job.id
                ),
                metadata: serde_json::json!({
                    "jobId": job.id,
                    "projectId": job.project_id,
                    "commitSha": job.commit_sha,
                    "branch": job.branch,
                }),
            };
            if let Err(e) = self.inner.sink.send(alert).await {
                warn!(error = %e, "Failed to send recovery notification");
            }
        }
        report.failed = interrupted.len();

        for job in self.inner.store.list_queued_jobs().await? {
            match projects.get(ResourceId::from_uuid(job.project_id)).await {
                Ok(project) if project.enabled => {
                    self.inner
                        .queue
                        .lock()
                        .await
                        .push_back(QueuedEntry { job, project });
                    self.inner.queue_wakeup.notify_one();
                    report.requeued += 1;
                }
                Ok(_) | Err(DbError::NotFound(_)) => {
                    warn!(job_id = %job.id, "Queued job has no usable project, cancelling");
                    self.inner
                        .store
                        .mark_job_cancelled(ResourceId::from_uuid(job.id))
                        .await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if report.failed > 0 || report.requeued > 0 {
            info!(
                failed = report.failed,
                requeued = report.requeued,
                "Recovery complete"
            );
        }
        Ok(report)
    }
}

impl Inner {
    /// Run one admitted job to its terminal state.
    ///
    /// The runner executes in its own task so a panic surfaces as a
    /// `JoinError` instead of skipping cleanup: the terminal transition is
    /// persisted, the running set is pruned, and the slot is released on
    /// every path.
    async fn execute(
        inner: Arc<Inner>,
        entry: QueuedEntry,
        started_at: DateTime<Utc>,
        permit: OwnedSemaphorePermit,
    ) {
        let job = PipelineJob {
            status: JobStatus::Running,
            started_at: Some(started_at),
            ..entry.job
        };
        let project = entry.project;
        let job_id = job.id;

        let runner = inner.runner.clone();
        let handle = tokio::spawn({
            let job = job.clone();
            let project = project.clone();
            async move { runner.deploy(job, project).await }
        });

        let outcome: shipwright_core::Result<Deployment> = match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(shipwright_core::Error::Internal(format!(
                "deployment task aborted: {}",
                join_err
            ))),
        };

        let completed_at = Utc::now();
        let (status, deployment, error_message) = match outcome {
            Ok(dep) if dep.success => (JobStatus::Completed, Some(dep), None),
            Ok(dep) => {
                let message = dep
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "deployment failed".to_string());
                (JobStatus::Failed, Some(dep), Some(message))
            }
            Err(e) => (JobStatus::Failed, None, Some(e.to_string())),
        };

        if let Err(e) = inner
            .store
            .mark_job_finished(
                ResourceId::from_uuid(job_id),
                status,
                deployment.as_ref().map(|d| d.id),
                completed_at,
            )
            .await
        {
            error!(job_id = %job_id, error = %e, "Failed to persist terminal job state");
        }

        inner.running.lock().await.remove(&job_id);
        drop(permit);

        match status {
            JobStatus::Completed => {
                info!(job_id = %job_id, project = %project.name, "Job completed")
            }
            _ => {
                error!(
                    job_id = %job_id,
                    project = %project.name,
                    error = ?error_message,
                    "Job failed"
                )
            }
        }

        inner
            .notify_outcome(&job, &project, status, deployment.as_ref(), error_message)
            .await;
    }

    async fn notify_outcome(
        &self,
        job: &PipelineJob,
        project: &ProjectConfig,
        status: JobStatus,
        deployment: Option<&Deployment>,
        error_message: Option<String>,
    ) {
        let (level, message) = match status {
            JobStatus::Completed => (
                AlertLevel::Info,
                format!(
                    "Deployment succeeded for {} ({} @ {})",
                    project.name, job.branch, job.commit_sha
                ),
            ),
            _ => (
                AlertLevel::Critical,
                format!(
                    "Deployment failed for {} ({} @ {}): {}",
                    project.name,
                    job.branch,
                    job.commit_sha,
                    error_message.as_deref().unwrap_or("unknown error")
                ),
            ),
        };

        let alert = Alert {
            kind: "deployment".to_string(),
            level,
            message,
            metadata: serde_json::json!({
                "jobId": job.id,
                "projectId": project.id,
                "projectName": project.name,
                "commitSha": job.commit_sha,
                "branch": job.branch,
                "deploymentId": deployment.map(|d| d.id),
            }),
        };

        if let Err(e) = self.sink.send(alert).await {
            warn!(job_id = %job.id, error = %e, "Failed to send deployment notification");
        }
    }
}
