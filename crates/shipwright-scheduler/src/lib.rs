//! Job scheduling for the Shipwright deployment pipeline.
//!
//! Turns queued pipeline jobs into running deployments while holding the
//! number of concurrent deployments under a configured cap.

pub mod scheduler;

pub use scheduler::{
    QueueStatus, RecoveryReport, RunningJob, Scheduler, SchedulerConfig, SchedulerError,
};
