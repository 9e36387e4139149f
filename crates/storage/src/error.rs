//! Storage errors.

use sqlx::error::DatabaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    #[error("Query error: {0}")]
    Query(#[source] sqlx::Error),

    /// A uniqueness invariant (slide/quiz position, queue dedup key, ...) was
    /// violated. Recognized from the Postgres driver's SQLSTATE `23505`, kept
    /// distinct from `Query` so callers can pattern-match without string
    /// inspection (C1 upsert-merge, C5 dedup).
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for platform_domain::DomainError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateKey(msg) => platform_domain::DomainError::DuplicateKey(msg),
            StorageError::NotFound(msg) => platform_domain::DomainError::NotFound(msg),
            other => platform_domain::DomainError::Database(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some("23505") {
                return StorageError::DuplicateKey(db_err.message().to_string());
            }
        }
        StorageError::Query(err)
    }
}
