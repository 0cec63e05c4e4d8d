//! Git operations over the system git binary.

use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::info;

/// Git operation errors.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git {0} failed: {1}")]
    CommandFailed(&'static str, String),
}

/// Clone a single branch of a repository into `dest`.
pub async fn clone_branch(repo_url: &str, branch: &str, dest: &Path) -> Result<(), GitError> {
    info!(branch = %branch, path = %dest.display(), "Cloning repository");
    run(
        "clone",
        Command::new("git")
            .args(["clone", "--branch", branch, "--single-branch", repo_url])
            .arg(dest),
        Some(repo_url),
    )
    .await
}

/// Fetch `branch` from origin and sync the working tree to the fetched
/// head. Deploy workspaces are never authored in, so a forced branch reset
/// is the intended pull.
pub async fn sync_branch(workdir: &Path, branch: &str) -> Result<(), GitError> {
    info!(branch = %branch, path = %workdir.display(), "Updating repository");
    run(
        "fetch",
        Command::new("git")
            .args(["fetch", "origin", branch])
            .current_dir(workdir),
        None,
    )
    .await?;
    run(
        "checkout",
        Command::new("git")
            .args(["checkout", "-B", branch, "FETCH_HEAD"])
            .current_dir(workdir),
        None,
    )
    .await
}

async fn run(
    label: &'static str,
    cmd: &mut Command,
    redact_url: Option<&str>,
) -> Result<(), GitError> {
    let output = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        // clone URLs may embed credentials
        if let Some(url) = redact_url {
            if url.contains('@') {
                stderr = stderr.replace(url, "[redacted]");
            }
        }
        return Err(GitError::CommandFailed(label, crate::deployer::truncate_output(stderr)));
    }
    Ok(())
}
