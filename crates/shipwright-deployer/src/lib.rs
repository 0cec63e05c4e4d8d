//! Deployment execution for the Shipwright pipeline.
//!
//! Runs the repository sync / install / build sequence for one admitted
//! job and records the outcome.

pub mod deployer;
pub mod git;

pub use deployer::{DeployError, Deployer};
pub use git::GitError;
