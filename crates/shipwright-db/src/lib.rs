//! Persistence layer for the Shipwright deployment pipeline.
//!
//! Provides the audit/project store traits, PostgreSQL implementations,
//! and an in-memory implementation for tests and local development.

pub mod error;
pub mod memory;
pub mod pg;
pub mod store;

pub use error::{DbError, DbResult};
pub use memory::{MemoryAuditStore, MemoryProjectStore};
pub use pg::{PgAuditStore, PgProjectStore};
pub use store::{AuditStore, EventFilter, JobFilter, JobStatistics, ProjectStore};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
