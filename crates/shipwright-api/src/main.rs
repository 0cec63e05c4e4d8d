//! Shipwright API server.

use std::sync::Arc;

use shipwright_api::{routes, AppState, ServerConfig};
use shipwright_core::{LogSink, NotificationSink};
use shipwright_db::{create_pool, run_migrations, AuditStore, PgAuditStore, PgProjectStore, ProjectStore};
use shipwright_deployer::Deployer;
use shipwright_scheduler::{Scheduler, SchedulerConfig};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Create database pool
    info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    info!("Database connected");

    let store: Arc<dyn AuditStore> = Arc::new(PgAuditStore::new(pool.clone()));
    let projects: Arc<dyn ProjectStore> = Arc::new(PgProjectStore::new(pool));
    let sink: Arc<dyn NotificationSink> = Arc::new(LogSink);

    let deployer = Arc::new(Deployer::new(
        config.work_dir.clone(),
        config.backup_dir.clone(),
        store.clone(),
    ));

    let scheduler = Scheduler::new(
        SchedulerConfig {
            max_concurrent: config.max_concurrent_jobs,
        },
        store.clone(),
        sink,
        deployer.clone(),
    );

    // Reconcile jobs left over from a previous process before accepting
    // new work.
    scheduler.recover(projects.as_ref()).await?;

    tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run().await }
    });

    let state = AppState::new(store, projects, scheduler, deployer);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    info!("Starting server on {}", config.listen_addr);
    let listener = TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
