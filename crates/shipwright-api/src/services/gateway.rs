//! The webhook gateway: verification, parsing, and deployment triggering.
//!
//! Verification happens before anything is persisted. A rejected webhook
//! leaves no trace beyond a log line.

use std::sync::Arc;

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use shipwright_core::{GitProvider, NewWebhookEvent, ProjectConfig, PushEvent, ResourceId};
use shipwright_db::{AuditStore, DbError, ProjectStore};
use shipwright_scheduler::{Scheduler, SchedulerError};

/// Gateway processing errors. Anything here means no job was enqueued.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unknown project")]
    UnknownProject,

    #[error("webhook validation failed")]
    InvalidSignature,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Result of processing one webhook delivery.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub event_id: Option<Uuid>,
    pub job_id: Option<Uuid>,
    pub should_deploy: bool,
}

impl WebhookOutcome {
    fn ignored() -> Self {
        Self {
            event_id: None,
            job_id: None,
            should_deploy: false,
        }
    }
}

/// Verifies inbound webhooks, records them, and enqueues qualifying pushes.
pub struct WebhookGateway {
    store: Arc<dyn AuditStore>,
    projects: Arc<dyn ProjectStore>,
    scheduler: Scheduler,
}

impl WebhookGateway {
    pub fn new(
        store: Arc<dyn AuditStore>,
        projects: Arc<dyn ProjectStore>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            store,
            projects,
            scheduler,
        }
    }

    /// Process one webhook delivery. Returns synchronously once the event
    /// is recorded and any job is queued; never waits on the deployment.
    pub async fn process(
        &self,
        provider: GitProvider,
        project_hint: Option<Uuid>,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<WebhookOutcome, GatewayError> {
        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidPayload(format!("invalid JSON: {}", e)))?;

        let project = self.resolve_project(provider, project_hint, &payload).await?;

        if !self.verify(provider, &project, headers, body) {
            warn!(
                provider = %provider,
                project = %project.name,
                "Rejected webhook with invalid signature"
            );
            return Err(GatewayError::InvalidSignature);
        }

        let event_type = header_str(headers, provider.event_type_header()).unwrap_or("unknown");
        if event_type != provider.push_event_type() {
            info!(
                provider = %provider,
                project = %project.name,
                event = %event_type,
                "Ignoring non-push event"
            );
            return Ok(WebhookOutcome::ignored());
        }

        let push = PushEvent::from_payload(provider, &payload).ok_or_else(|| {
            GatewayError::InvalidPayload("push carries no deployable branch head".to_string())
        })?;

        // providers re-deliver events; a seen delivery id is answered with
        // the original event and nothing new is queued
        let delivery_id = header_str(headers, provider.delivery_header()).map(String::from);
        if let Some(delivery) = delivery_id.as_deref() {
            if let Some(existing) = self.store.find_event_by_delivery(provider, delivery).await? {
                info!(
                    provider = %provider,
                    delivery = %delivery,
                    event_id = %existing.id,
                    "Duplicate delivery, already recorded"
                );
                return Ok(WebhookOutcome {
                    event_id: Some(existing.id),
                    job_id: None,
                    should_deploy: false,
                });
            }
        }

        // audit record is written even when the branch does not qualify
        let event = self
            .store
            .record_event(NewWebhookEvent {
                project_id: Some(project.id),
                provider,
                event_type: event_type.to_string(),
                delivery_id,
                repository: push.repository.clone(),
                branch: push.branch.clone(),
                commit_sha: push.commit.sha.clone(),
                commit_message: push.commit.message.clone(),
                author: push.commit.author.clone(),
                payload,
            })
            .await?;

        let should_deploy = project.enabled && project.should_trigger_deployment(&push.branch);
        let job_id = if should_deploy {
            let job_id = self
                .scheduler
                .enqueue(&project, &push.commit.sha, &push.branch, Some(event.id))
                .await?;
            Some(job_id)
        } else {
            info!(
                project = %project.name,
                branch = %push.branch,
                "Push recorded, branch does not trigger deployment"
            );
            None
        };

        Ok(WebhookOutcome {
            event_id: Some(event.id),
            job_id,
            should_deploy,
        })
    }

    async fn resolve_project(
        &self,
        provider: GitProvider,
        project_hint: Option<Uuid>,
        payload: &serde_json::Value,
    ) -> Result<ProjectConfig, GatewayError> {
        match project_hint {
            Some(id) => match self.projects.get(ResourceId::from_uuid(id)).await {
                Ok(project) => Ok(project),
                Err(DbError::NotFound(_)) => Err(GatewayError::UnknownProject),
                Err(e) => Err(e.into()),
            },
            None => {
                let full_name = repository_full_name(provider, payload).ok_or_else(|| {
                    GatewayError::InvalidPayload("missing repository name".to_string())
                })?;
                self.projects
                    .find_by_repository(provider, full_name)
                    .await?
                    .ok_or(GatewayError::UnknownProject)
            }
        }
    }

    fn verify(
        &self,
        provider: GitProvider,
        project: &ProjectConfig,
        headers: &HeaderMap,
        body: &[u8],
    ) -> bool {
        match provider {
            GitProvider::Github => verify_github_signature(
                &project.webhook_secret,
                body,
                header_str(headers, "X-Hub-Signature-256"),
            ),
            GitProvider::Gitlab => verify_gitlab_token(
                &project.webhook_secret,
                header_str(headers, "X-Gitlab-Token"),
            ),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn repository_full_name(provider: GitProvider, payload: &serde_json::Value) -> Option<&str> {
    match provider {
        GitProvider::Github => payload.get("repository")?.get("full_name")?.as_str(),
        GitProvider::Gitlab => payload.get("project")?.get("path_with_namespace")?.as_str(),
    }
}

/// Verify a GitHub webhook signature: HMAC-SHA256 of the raw body under
/// the project secret, compared in constant time.
pub fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    // Signature format: "sha256=<hex>"
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take any size key");
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}

/// Verify a GitLab webhook token in constant time.
pub fn verify_gitlab_token(expected: &str, supplied: Option<&str>) -> bool {
    let Some(supplied) = supplied else {
        return false;
    };
    supplied.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use serde_json::json;
    use shipwright_core::{
        Deployment, DeployRunner, JobStatus, LogSink, PipelineJob,
    };
    use shipwright_db::{EventFilter, JobFilter, MemoryAuditStore, MemoryProjectStore};
    use shipwright_scheduler::SchedulerConfig;

    struct NoopRunner;

    #[async_trait]
    impl DeployRunner for NoopRunner {
        async fn deploy(
            &self,
            _job: PipelineJob,
            _project: ProjectConfig,
        ) -> shipwright_core::Result<Deployment> {
            unimplemented!("gateway tests never start the scheduling loop")
        }
    }

    const SECRET: &str = "s3cret";

    fn test_project(provider: GitProvider, filter: &[&str]) -> ProjectConfig {
        ProjectConfig {
            id: Uuid::now_v7(),
            name: "site".to_string(),
            provider,
            repository: "acme/site".to_string(),
            repo_url: "https://github.com/acme/site.git".to_string(),
            webhook_secret: SECRET.to_string(),
            branch_filter: filter.iter().map(|s| s.to_string()).collect(),
            install_command: None,
            build_command: None,
            enabled: true,
        }
    }

    struct Harness {
        gateway: WebhookGateway,
        store: Arc<MemoryAuditStore>,
    }

    fn harness(project: ProjectConfig) -> Harness {
        let store = Arc::new(MemoryAuditStore::new());
        let projects = Arc::new(MemoryProjectStore::new(vec![project]));
        let scheduler = Scheduler::new(
            SchedulerConfig::default(),
            store.clone(),
            Arc::new(LogSink),
            Arc::new(NoopRunner),
        );
        Harness {
            gateway: WebhookGateway::new(store.clone(), projects, scheduler),
            store,
        }
    }

    fn github_payload(branch: &str) -> Vec<u8> {
        json!({
            "ref": format!("refs/heads/{}", branch),
            "compare": "https://github.com/acme/site/compare/aaa...bbb",
            "repository": { "full_name": "acme/site" },
            "pusher": { "name": "jdoe" },
            "head_commit": {
                "id": "bbb222",
                "message": "Ship it",
                "timestamp": "2025-06-01T12:30:00Z",
                "author": { "name": "Jane Doe" }
            }
        })
        .to_string()
        .into_bytes()
    }

    fn sign(body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn github_headers(body: &[u8], event: &str, delivery: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-GitHub-Event", HeaderValue::from_str(event).unwrap());
        headers.insert("X-GitHub-Delivery", HeaderValue::from_str(delivery).unwrap());
        headers.insert(
            "X-Hub-Signature-256",
            HeaderValue::from_str(&sign(body)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_github_signature_accepts_valid() {
        let body = b"payload bytes";
        assert!(verify_github_signature(
            SECRET,
            body,
            Some(&sign(body))
        ));
    }

    #[test]
    fn test_github_signature_rejects_tampering() {
        let body = b"payload bytes".to_vec();
        let signature = sign(&body);

        // flip each byte of the body in turn
        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert!(!verify_github_signature(SECRET, &tampered, Some(&signature)));
        }

        // tamper with the signature hex itself
        let mut bad = signature.clone().into_bytes();
        let last = bad.len() - 1;
        bad[last] = if bad[last] == b'0' { b'1' } else { b'0' };
        assert!(!verify_github_signature(
            SECRET,
            &body,
            Some(std::str::from_utf8(&bad).unwrap())
        ));
    }

    #[test]
    fn test_github_signature_rejects_missing_or_malformed() {
        let body = b"payload bytes";
        assert!(!verify_github_signature(SECRET, body, None));
        assert!(!verify_github_signature(SECRET, body, Some("deadbeef")));
        assert!(!verify_github_signature(SECRET, body, Some("sha256=zz")));
        assert!(!verify_github_signature("wrong", body, Some(&sign(body))));
    }

    #[test]
    fn test_gitlab_token_comparison() {
        assert!(verify_gitlab_token("tok-1", Some("tok-1")));
        assert!(!verify_gitlab_token("tok-1", Some("tok-2")));
        assert!(!verify_gitlab_token("tok-1", Some("tok-11")));
        assert!(!verify_gitlab_token("tok-1", None));
    }

    #[tokio::test]
    async fn test_qualifying_push_records_event_and_enqueues() {
        let h = harness(test_project(GitProvider::Github, &["main"]));
        let body = github_payload("main");
        let headers = github_headers(&body, "push", "d-1");

        let outcome = h
            .gateway
            .process(GitProvider::Github, None, &headers, &body)
            .await
            .unwrap();

        assert!(outcome.should_deploy);
        let event_id = outcome.event_id.unwrap();
        let job_id = outcome.job_id.unwrap();

        let events = h
            .store
            .list_events(EventFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, event_id);
        assert_eq!(events[0].branch, "main");

        let job = h.store.get_job(ResourceId::from_uuid(job_id)).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.webhook_event_id, Some(event_id));
    }

    #[tokio::test]
    async fn test_non_matching_branch_is_recorded_but_not_deployed() {
        let h = harness(test_project(GitProvider::Github, &["main"]));
        let body = github_payload("develop");
        let headers = github_headers(&body, "push", "d-1");

        let outcome = h
            .gateway
            .process(GitProvider::Github, None, &headers, &body)
            .await
            .unwrap();

        assert!(!outcome.should_deploy);
        assert!(outcome.event_id.is_some());
        assert!(outcome.job_id.is_none());

        assert_eq!(
            h.store.list_events(EventFilter::default(), 10).await.unwrap().len(),
            1
        );
        assert!(h
            .store
            .list_jobs(JobFilter::default(), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_signature_rejected_without_persisting() {
        let h = harness(test_project(GitProvider::Github, &["main"]));
        let body = github_payload("main");
        let mut headers = github_headers(&body, "push", "d-1");
        headers.remove("X-Hub-Signature-256");

        let result = h
            .gateway
            .process(GitProvider::Github, None, &headers, &body)
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidSignature)));

        assert!(h
            .store
            .list_events(EventFilter::default(), 10)
            .await
            .unwrap()
            .is_empty());
        assert!(h
            .store
            .list_jobs(JobFilter::default(), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_non_push_event_is_ignored_not_rejected() {
        let h = harness(test_project(GitProvider::Github, &["main"]));
        let body = github_payload("main");
        let headers = github_headers(&body, "ping", "d-1");

        let outcome = h
            .gateway
            .process(GitProvider::Github, None, &headers, &body)
            .await
            .unwrap();

        assert!(!outcome.should_deploy);
        assert!(outcome.event_id.is_none());
        assert!(h
            .store
            .list_events(EventFilter::default(), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_answers_with_original_event() {
        let h = harness(test_project(GitProvider::Github, &["main"]));
        let body = github_payload("main");
        let headers = github_headers(&body, "push", "d-1");

        let first = h
            .gateway
            .process(GitProvider::Github, None, &headers, &body)
            .await
            .unwrap();
        let second = h
            .gateway
            .process(GitProvider::Github, None, &headers, &body)
            .await
            .unwrap();

        assert_eq!(second.event_id, first.event_id);
        assert!(!second.should_deploy);
        assert!(second.job_id.is_none());
        assert_eq!(
            h.store.list_jobs(JobFilter::default(), 10).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_repository_is_rejected() {
        let h = harness(test_project(GitProvider::Github, &["main"]));
        let body = json!({
            "ref": "refs/heads/main",
            "repository": { "full_name": "acme/other" },
            "head_commit": { "id": "x", "message": "m" }
        })
        .to_string()
        .into_bytes();
        let headers = github_headers(&body, "push", "d-1");

        let result = h
            .gateway
            .process(GitProvider::Github, None, &headers, &body)
            .await;
        assert!(matches!(result, Err(GatewayError::UnknownProject)));
    }

    #[tokio::test]
    async fn test_disabled_project_is_audited_but_never_deployed() {
        let mut project = test_project(GitProvider::Github, &["*"]);
        project.enabled = false;
        let h = harness(project);
        let body = github_payload("main");
        let headers = github_headers(&body, "push", "d-1");

        let outcome = h
            .gateway
            .process(GitProvider::Github, None, &headers, &body)
            .await
            .unwrap();
        assert!(!outcome.should_deploy);
        assert!(outcome.event_id.is_some());
        assert!(h
            .store
            .list_jobs(JobFilter::default(), 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_gitlab_push_with_token() {
        let h = harness(test_project(GitProvider::Gitlab, &["main"]));
        let body = json!({
            "object_kind": "push",
            "ref": "refs/heads/main",
            "before": "aaa111",
            "after": "bbb222",
            "checkout_sha": "bbb222",
            "user_name": "jdoe",
            "project": {
                "path_with_namespace": "acme/site",
                "web_url": "https://gitlab.com/acme/site"
            },
            "commits": [{ "id": "bbb222", "message": "Ship it" }]
        })
        .to_string()
        .into_bytes();

        let mut headers = HeaderMap::new();
        headers.insert("X-Gitlab-Event", HeaderValue::from_static("Push Hook"));
        headers.insert("X-Gitlab-Token", HeaderValue::from_static(SECRET));
        headers.insert("X-Gitlab-Event-UUID", HeaderValue::from_static("u-1"));

        let outcome = h
            .gateway
            .process(GitProvider::Gitlab, None, &headers, &body)
            .await
            .unwrap();
        assert!(outcome.should_deploy);
        assert!(outcome.job_id.is_some());

        // wrong token is rejected
        headers.insert("X-Gitlab-Token", HeaderValue::from_static("wrong"));
        let result = h
            .gateway
            .process(GitProvider::Gitlab, None, &headers, &body)
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidSignature)));
    }
}
