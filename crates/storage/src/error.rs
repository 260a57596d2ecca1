//! Storage error types.

use thiserror::Error;

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying database failure. Treated as transient by job workers.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted value could not be decoded into its domain type.
    #[error("corrupt persisted value: {0}")]
    Corrupt(String),

    /// The migration runner failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Convenience type alias for storage results.
pub type Result<T> = std::result::Result<T, StorageError>;
