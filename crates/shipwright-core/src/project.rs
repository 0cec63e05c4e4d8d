//! Per-project deployment configuration.
//!
//! Supplied externally and read-only to the pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::GitProvider;

/// Configuration for one deployable project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: Uuid,
    pub name: String,
    pub provider: GitProvider,
    /// Provider-side repository full name, e.g. `acme/site`.
    pub repository: String,
    /// Clone URL used for workspace sync.
    pub repo_url: String,
    /// Shared secret for webhook verification. GitHub signs the body with
    /// it; GitLab sends it verbatim as a token.
    #[serde(skip_serializing)]
    pub webhook_secret: String,
    /// Branches that trigger deployment: exact names, or the literal `*`
    /// for all branches.
    pub branch_filter: Vec<String>,
    pub install_command: Option<String>,
    pub build_command: Option<String>,
    pub enabled: bool,
}

impl ProjectConfig {
    /// Whether a push to `branch` qualifies for deployment.
    ///
    /// True iff the filter contains the literal wildcard `*`, or contains
    /// `branch` exactly. No glob or regex matching.
    pub fn should_trigger_deployment(&self, branch: &str) -> bool {
        self.branch_filter.iter().any(|b| b == "*" || b == branch)
    }

    /// Parse a stored comma-separated branch filter, trimming whitespace
    /// and dropping empty entries.
    pub fn parse_branch_filter(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with_filter(filter: &[&str]) -> ProjectConfig {
        ProjectConfig {
            id: Uuid::now_v7(),
            name: "site".to_string(),
            provider: GitProvider::Github,
            repository: "acme/site".to_string(),
            repo_url: "https://github.com/acme/site.git".to_string(),
            webhook_secret: "s3cret".to_string(),
            branch_filter: filter.iter().map(|s| s.to_string()).collect(),
            install_command: Some("npm install".to_string()),
            build_command: None,
            enabled: true,
        }
    }

    #[test]
    fn test_exact_branch_match() {
        let project = project_with_filter(&["main"]);
        assert!(project.should_trigger_deployment("main"));
        assert!(!project.should_trigger_deployment("develop"));
    }

    #[test]
    fn test_wildcard_matches_all() {
        let project = project_with_filter(&["*"]);
        assert!(project.should_trigger_deployment("main"));
        assert!(project.should_trigger_deployment("develop"));
    }

    #[test]
    fn test_no_glob_expansion() {
        // `*` is only special as the whole entry
        let project = project_with_filter(&["release/*"]);
        assert!(!project.should_trigger_deployment("release/1.0"));
        assert!(project.should_trigger_deployment("release/*"));
    }

    #[test]
    fn test_parse_branch_filter() {
        assert_eq!(
            ProjectConfig::parse_branch_filter("main, develop ,"),
            vec!["main", "develop"]
        );
        assert_eq!(ProjectConfig::parse_branch_filter("*"), vec!["*"]);
        assert!(ProjectConfig::parse_branch_filter("").is_empty());
    }
}
