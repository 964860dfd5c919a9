use thiserror::Error;

/// Failures while bringing up the relational store.
#[derive(Error, Debug)]
pub enum RagdeskError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
