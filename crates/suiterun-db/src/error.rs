//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for suiterun_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => suiterun_core::Error::NotFound(msg),
            DbError::Duplicate(msg) | DbError::Conflict(msg) => {
                suiterun_core::Error::Conflict(msg)
            }
            other => suiterun_core::Error::Internal(other.to_string()),
        }
    }
}
