//! Storage layer for the adaptive-learning backend.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod budget_repository;
pub mod content_repository;
pub mod error;
pub mod queue_repository;
pub mod virtual_repository;

pub use budget_repository::BudgetRepository;
pub use content_repository::ContentRepository;
pub use error::StorageError;
pub use queue_repository::QueueRepository;
pub use virtual_repository::VirtualRepository;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(StorageError::Connection)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(StorageError::Migration)
}

/// Check database connectivity.
pub async fn check_connection(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(StorageError::Query)?;
    Ok(())
}
