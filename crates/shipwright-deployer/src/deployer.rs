//! The deployment executor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

use shipwright_core::{DeployRunner, Deployment, NewDeployment, PipelineJob, ProjectConfig};
use shipwright_db::AuditStore;

use crate::git;

/// Cap on captured subprocess output carried in error messages.
const MAX_CAPTURED_OUTPUT: usize = 2000;

/// Deployment errors. The variant describes which step failed; the message
/// carries the captured output of that step.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("invalid project name: {0:?}")]
    InvalidProjectName(String),

    #[error("no workspace for project {0}")]
    WorkspaceNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Git(#[from] git::GitError),

    #[error("install failed: {0}")]
    InstallFailed(String),

    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("backup failed: {0}")]
    BackupFailed(String),
}

/// Executes the sync / install / build sequence for admitted jobs.
///
/// One workspace directory per project, under `work_dir`. A per-project
/// lock serializes the whole sequence, so two jobs for the same project
/// never race on the checkout.
pub struct Deployer {
    work_dir: PathBuf,
    backup_dir: PathBuf,
    store: Arc<dyn AuditStore>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Deployer {
    pub fn new(work_dir: PathBuf, backup_dir: PathBuf, store: Arc<dyn AuditStore>) -> Self {
        Self {
            work_dir,
            backup_dir,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The lock guarding a project's workspace.
    async fn workspace_lock(&self, project_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(project_id)
            .or_default()
            .clone()
    }

    /// Resolve the workspace directory for a project name.
    ///
    /// Names are used as path components verbatim, so anything outside a
    /// conservative character set is refused.
    fn workspace_path(&self, name: &str) -> Result<PathBuf, DeployError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(DeployError::InvalidProjectName(name.to_string()));
        }
        Ok(self.work_dir.join(name))
    }

    /// Steps 1-4: resolve workspace, sync the repository, install, build.
    /// The first failing step aborts the sequence.
    async fn run_sequence(&self, job: &PipelineJob, project: &ProjectConfig) -> Result<(), DeployError> {
        let workspace = self.workspace_path(&project.name)?;

        if workspace.exists() {
            git::sync_branch(&workspace, &job.branch).await?;
        } else {
            tokio::fs::create_dir_all(&self.work_dir).await?;
            git::clone_branch(&project.repo_url, &job.branch, &workspace).await?;
        }

        if let Some(command) = &project.install_command {
            info!(project = %project.name, command = %command, "Installing dependencies");
            run_step(&workspace, command)
                .await
                .map_err(DeployError::InstallFailed)?;
        }

        if let Some(command) = &project.build_command {
            info!(project = %project.name, command = %command, "Running build");
            run_step(&workspace, command)
                .await
                .map_err(DeployError::BuildFailed)?;
        }

        Ok(())
    }

    /// Archive a project's workspace into a timestamped snapshot for manual
    /// restoration. Operator tool; not part of the deployment sequence.
    pub async fn backup_workspace(&self, project: &ProjectConfig) -> Result<PathBuf, DeployError> {
        let workspace = self.workspace_path(&project.name)?;

        let lock = self.workspace_lock(project.id).await;
        let _guard = lock.lock().await;

        if !workspace.exists() {
            return Err(DeployError::WorkspaceNotFound(project.name.clone()));
        }
        tokio::fs::create_dir_all(&self.backup_dir).await?;

        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let archive = self
            .backup_dir
            .join(format!("{}-{}.tar.gz", project.name, stamp));

        let output = Command::new("tar")
            .arg("-czf")
            .arg(&archive)
            .arg("-C")
            .arg(&self.work_dir)
            .arg(&project.name)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DeployError::BackupFailed(truncate_output(stderr)));
        }

        info!(project = %project.name, archive = %archive.display(), "Workspace backed up");
        Ok(archive)
    }
}

#[async_trait]
impl DeployRunner for Deployer {
    async fn deploy(
        &self,
        job: PipelineJob,
        project: ProjectConfig,
    ) -> shipwright_core::Result<Deployment> {
        let started_at = Utc::now();
        info!(
            job_id = %job.id,
            project = %project.name,
            branch = %job.branch,
            sha = %job.commit_sha,
            "Starting deployment"
        );

        let lock = self.workspace_lock(project.id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.run_sequence(&job, &project).await
        };

        if let Err(e) = &outcome {
            error!(job_id = %job.id, project = %project.name, error = %e, "Deployment step failed");
        }

        let deployment = self
            .store
            .record_deployment(NewDeployment {
                job_id: job.id,
                success: outcome.is_ok(),
                error_message: outcome.err().map(|e| e.to_string()),
                started_at,
                completed_at: Utc::now(),
            })
            .await
            .map_err(|e| shipwright_core::Error::Storage(e.to_string()))?;

        Ok(deployment)
    }
}

/// Run one declared step through the shell, in the workspace directory.
/// Returns the captured failure output on a non-zero exit.
async fn run_step(workspace: &Path, command: &str) -> Result<(), String> {
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .current_dir(workspace)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| format!("failed to spawn {:?}: {}", command, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(truncate_output(format!(
            "{:?} exited with {}: {}",
            command, output.status, detail
        )));
    }
    Ok(())
}

/// Bound captured output without splitting a UTF-8 character.
pub(crate) fn truncate_output(mut s: String) -> String {
    if s.len() > MAX_CAPTURED_OUTPUT {
        let mut end = MAX_CAPTURED_OUTPUT;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_core::{GitProvider, JobStatus};
    use shipwright_db::MemoryAuditStore;

    fn test_deployer(store: Arc<MemoryAuditStore>) -> Deployer {
        let base = std::env::temp_dir().join(format!("shipwright-test-{}", Uuid::now_v7()));
        Deployer::new(base.join("work"), base.join("backups"), store)
    }

    fn test_project(name: &str) -> ProjectConfig {
        ProjectConfig {
            id: Uuid::now_v7(),
            name: name.to_string(),
            provider: GitProvider::Github,
            repository: "acme/site".to_string(),
            repo_url: "https://github.com/acme/site.git".to_string(),
            webhook_secret: "s3cret".to_string(),
            branch_filter: vec!["main".to_string()],
            install_command: None,
            build_command: None,
            enabled: true,
        }
    }

    fn test_job(project: &ProjectConfig) -> PipelineJob {
        PipelineJob {
            id: Uuid::now_v7(),
            project_id: project.id,
            webhook_event_id: None,
            commit_sha: "abc123".to_string(),
            branch: "main".to_string(),
            status: JobStatus::Running,
            queued_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: None,
            deployment_id: None,
        }
    }

    #[test]
    fn test_workspace_path_accepts_safe_names() {
        let deployer = test_deployer(Arc::new(MemoryAuditStore::new()));
        assert!(deployer.workspace_path("site").is_ok());
        assert!(deployer.workspace_path("my-app_2.0").is_ok());
    }

    #[test]
    fn test_workspace_path_rejects_unsafe_names() {
        let deployer = test_deployer(Arc::new(MemoryAuditStore::new()));
        for name in ["", "..", ".hidden", "a/b", "a b", "../../etc"] {
            assert!(
                matches!(
                    deployer.workspace_path(name),
                    Err(DeployError::InvalidProjectName(_))
                ),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_run_step_captures_failure_output() {
        let dir = std::env::temp_dir();
        let err = run_step(&dir, "echo boom >&2; exit 1").await.unwrap_err();
        assert!(err.contains("boom"));
        assert!(err.contains("exit"));

        assert!(run_step(&dir, "true").await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_sequence_still_records_one_deployment() {
        let store = Arc::new(MemoryAuditStore::new());
        let deployer = test_deployer(store.clone());
        // unsafe name fails the sequence before any subprocess runs
        let project = ProjectConfig {
            name: "../evil".to_string(),
            ..test_project("x")
        };
        let job = test_job(&project);

        let deployment = deployer.deploy(job.clone(), project).await.unwrap();
        assert!(!deployment.success);
        assert!(deployment
            .error_message
            .as_deref()
            .unwrap()
            .contains("invalid project name"));
        assert_eq!(deployment.job_id, job.id);

        assert_eq!(store.list_deployments(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backup_archives_workspace() {
        let store = Arc::new(MemoryAuditStore::new());
        let deployer = test_deployer(store);
        let project = test_project("site");

        let workspace = deployer.workspace_path(&project.name).unwrap();
        tokio::fs::create_dir_all(&workspace).await.unwrap();
        tokio::fs::write(workspace.join("index.html"), "<html></html>")
            .await
            .unwrap();

        let archive = deployer.backup_workspace(&project).await.unwrap();
        assert!(archive.exists());
        let file_name = archive.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("site-"));
        assert!(file_name.ends_with(".tar.gz"));
    }

    #[tokio::test]
    async fn test_backup_requires_existing_workspace() {
        let store = Arc::new(MemoryAuditStore::new());
        let deployer = test_deployer(store);
        let project = test_project("ghost");
        assert!(matches!(
            deployer.backup_workspace(&project).await,
            Err(DeployError::WorkspaceNotFound(_))
        ));
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        let s = "é".repeat(MAX_CAPTURED_OUTPUT);
        let out = truncate_output(s);
        assert!(out.len() <= MAX_CAPTURED_OUTPUT);
        assert!(out.chars().all(|c| c == 'é'));
    }
}
