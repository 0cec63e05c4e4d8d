//! Git providers and webhook event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Git provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProvider {
    Github,
    Gitlab,
}

impl std::fmt::Display for GitProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitProvider::Github => write!(f, "github"),
            GitProvider::Gitlab => write!(f, "gitlab"),
        }
    }
}

impl std::str::FromStr for GitProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(GitProvider::Github),
            "gitlab" => Ok(GitProvider::Gitlab),
            _ => Err(format!("Unknown git provider: {}", s)),
        }
    }
}

impl GitProvider {
    /// Header carrying the provider's event type.
    pub fn event_type_header(&self) -> &'static str {
        match self {
            GitProvider::Github => "X-GitHub-Event",
            GitProvider::Gitlab => "X-Gitlab-Event",
        }
    }

    /// Header carrying the provider's delivery identifier.
    pub fn delivery_header(&self) -> &'static str {
        match self {
            GitProvider::Github => "X-GitHub-Delivery",
            GitProvider::Gitlab => "X-Gitlab-Event-UUID",
        }
    }

    /// Event type value that marks a branch push.
    pub fn push_event_type(&self) -> &'static str {
        match self {
            GitProvider::Github => "push",
            GitProvider::Gitlab => "Push Hook",
        }
    }
}

/// A webhook event as recorded for audit. Immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub provider: GitProvider,
    pub event_type: String,
    pub delivery_id: Option<String>,
    pub repository: String,
    pub branch: String,
    pub commit_sha: String,
    pub commit_message: String,
    pub author: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Fields for recording a new webhook event.
#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub project_id: Option<Uuid>,
    pub provider: GitProvider,
    pub event_type: String,
    pub delivery_id: Option<String>,
    pub repository: String,
    pub branch: String,
    pub commit_sha: String,
    pub commit_message: String,
    pub author: String,
    pub payload: serde_json::Value,
}

/// Head commit details from a push event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDetail {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Canonical push event, parsed from a provider payload.
///
/// Only pushes to branches parse; tag pushes and branch deletions carry no
/// deployable head and yield `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    pub repository: String,
    pub branch: String,
    pub commit: CommitDetail,
    pub pusher: String,
    pub compare_url: Option<String>,
}

impl PushEvent {
    /// Parse a GitHub push webhook payload.
    pub fn from_github_payload(payload: &serde_json::Value) -> Option<Self> {
        let r#ref = payload.get("ref")?.as_str()?;
        let branch = r#ref.strip_prefix("refs/heads/")?.to_string();
        let repository = payload
            .get("repository")?
            .get("full_name")?
            .as_str()?
            .to_string();

        let head = payload.get("head_commit")?;
        let commit = CommitDetail {
            sha: head.get("id")?.as_str()?.to_string(),
            message: head.get("message")?.as_str()?.to_string(),
            author: head
                .get("author")
                .and_then(|a| a.get("name"))
                .and_then(|n| n.as_str())
                .unwrap_or("unknown")
                .to_string(),
            timestamp: parse_timestamp(head.get("timestamp")),
        };

        let pusher = payload
            .get("pusher")
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("unknown")
            .to_string();

        let compare_url = payload
            .get("compare")
            .and_then(|c| c.as_str())
            .map(String::from);

        Some(PushEvent {
            repository,
            branch,
            commit,
            pusher,
            compare_url,
        })
    }

    /// Parse a GitLab push webhook payload.
    pub fn from_gitlab_payload(payload: &serde_json::Value) -> Option<Self> {
        let r#ref = payload.get("ref")?.as_str()?;
        let branch = r#ref.strip_prefix("refs/heads/")?.to_string();
        let repository = payload
            .get("project")?
            .get("path_with_namespace")?
            .as_str()?
            .to_string();

        // checkout_sha is null when the branch was deleted
        let sha = payload.get("checkout_sha")?.as_str()?.to_string();

        let first_commit = payload
            .get("commits")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first());

        let user_name = payload
            .get("user_name")
            .and_then(|n| n.as_str())
            .unwrap_or("unknown")
            .to_string();

        let commit = CommitDetail {
            sha,
            message: first_commit
                .and_then(|c| c.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string(),
            author: user_name.clone(),
            timestamp: parse_timestamp(first_commit.and_then(|c| c.get("timestamp"))),
        };

        let compare_url = match (
            payload
                .get("project")
                .and_then(|p| p.get("web_url"))
                .and_then(|u| u.as_str()),
            payload.get("before").and_then(|b| b.as_str()),
            payload.get("after").and_then(|a| a.as_str()),
        ) {
            (Some(web_url), Some(before), Some(after)) => {
                Some(format!("{}/compare/{}...{}", web_url, before, after))
            }
            _ => None,
        };

        Some(PushEvent {
            repository,
            branch,
            commit,
            pusher: user_name,
            compare_url,
        })
    }

    /// Parse a push payload for the given provider.
    pub fn from_payload(provider: GitProvider, payload: &serde_json::Value) -> Option<Self> {
        match provider {
            GitProvider::Github => Self::from_github_payload(payload),
            GitProvider::Gitlab => Self::from_gitlab_payload(payload),
        }
    }
}

fn parse_timestamp(value: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(|t| t.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn github_push() -> serde_json::Value {
        json!({
            "ref": "refs/heads/main",
            "before": "0000000000000000000000000000000000000001",
            "after": "4fc2b5e1a9c3d7f806b1e2d3c4a5968778695a4b",
            "compare": "https://github.com/acme/site/compare/0000000000...4fc2b5e1a9",
            "repository": { "full_name": "acme/site" },
            "pusher": { "name": "jdoe" },
            "head_commit": {
                "id": "4fc2b5e1a9c3d7f806b1e2d3c4a5968778695a4b",
                "message": "Fix login redirect",
                "timestamp": "2025-06-01T12:30:00+02:00",
                "author": { "name": "Jane Doe" }
            }
        })
    }

    fn gitlab_push() -> serde_json::Value {
        json!({
            "object_kind": "push",
            "ref": "refs/heads/develop",
            "before": "aaa111",
            "after": "bbb222",
            "checkout_sha": "bbb222",
            "user_name": "jdoe",
            "project": {
                "path_with_namespace": "acme/site",
                "web_url": "https://gitlab.com/acme/site"
            },
            "commits": [
                { "id": "bbb222", "message": "Tweak CI", "timestamp": "2025-06-01T10:00:00Z" }
            ]
        })
    }

    #[test]
    fn test_parse_github_push() {
        let event = PushEvent::from_github_payload(&github_push()).unwrap();
        assert_eq!(event.repository, "acme/site");
        assert_eq!(event.branch, "main");
        assert_eq!(event.commit.sha, "4fc2b5e1a9c3d7f806b1e2d3c4a5968778695a4b");
        assert_eq!(event.commit.message, "Fix login redirect");
        assert_eq!(event.commit.author, "Jane Doe");
        assert_eq!(event.pusher, "jdoe");
        assert!(event.commit.timestamp.is_some());
        assert!(event.compare_url.as_deref().unwrap().contains("/compare/"));
    }

    #[test]
    fn test_parse_gitlab_push() {
        let event = PushEvent::from_gitlab_payload(&gitlab_push()).unwrap();
        assert_eq!(event.repository, "acme/site");
        assert_eq!(event.branch, "develop");
        assert_eq!(event.commit.sha, "bbb222");
        assert_eq!(event.commit.message, "Tweak CI");
        assert_eq!(event.commit.author, "jdoe");
        assert_eq!(
            event.compare_url.as_deref(),
            Some("https://gitlab.com/acme/site/compare/aaa111...bbb222")
        );
    }

    #[test]
    fn test_tag_push_does_not_parse() {
        let mut payload = github_push();
        payload["ref"] = json!("refs/tags/v1.0.0");
        assert!(PushEvent::from_github_payload(&payload).is_none());
    }

    #[test]
    fn test_branch_deletion_does_not_parse() {
        let mut payload = github_push();
        payload["head_commit"] = json!(null);
        assert!(PushEvent::from_github_payload(&payload).is_none());

        let mut payload = gitlab_push();
        payload["checkout_sha"] = json!(null);
        assert!(PushEvent::from_gitlab_payload(&payload).is_none());
    }

    #[test]
    fn test_provider_round_trip() {
        assert_eq!("github".parse::<GitProvider>().unwrap(), GitProvider::Github);
        assert_eq!("GitLab".parse::<GitProvider>().unwrap(), GitProvider::Gitlab);
        assert!("bitbucket".parse::<GitProvider>().is_err());
        assert_eq!(GitProvider::Github.to_string(), "github");
    }
}
