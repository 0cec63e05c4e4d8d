//! Application state.

use std::sync::Arc;

use shipwright_db::{AuditStore, ProjectStore};
use shipwright_deployer::Deployer;
use shipwright_scheduler::Scheduler;

use crate::services::gateway::WebhookGateway;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AuditStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub scheduler: Scheduler,
    pub deployer: Arc<Deployer>,
    pub gateway: Arc<WebhookGateway>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AuditStore>,
        projects: Arc<dyn ProjectStore>,
        scheduler: Scheduler,
        deployer: Arc<Deployer>,
    ) -> Self {
        let gateway = Arc::new(WebhookGateway::new(
            store.clone(),
            projects.clone(),
            scheduler.clone(),
        ));
        Self {
            store,
            projects,
            scheduler,
            deployer,
            gateway,
        }
    }
}
