//! Core domain types and traits for the Shipwright deployment pipeline.
//!
//! This crate contains:
//! - Resource identifiers and common types
//! - Git providers and canonical push events
//! - Project configuration and branch qualification
//! - Pipeline jobs and their status machine
//! - Deployment records and the runner trait
//! - Notification sink trait and alert types

pub mod deploy;
pub mod error;
pub mod event;
pub mod id;
pub mod job;
pub mod notify;
pub mod project;

pub use deploy::{Deployment, DeployRunner, NewDeployment};
pub use error::{Error, Result};
pub use event::{CommitDetail, GitProvider, NewWebhookEvent, PushEvent, WebhookEvent};
pub use id::ResourceId;
pub use job::{JobStatus, NewPipelineJob, PipelineJob};
pub use notify::{Alert, AlertLevel, LogSink, NotificationSink};
pub use project::ProjectConfig;
