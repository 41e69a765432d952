//! Error types for suiterun.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limit reached for environment {environment}: {active}/{limit} active runs")]
    RateLimited {
        environment: String,
        active: i64,
        limit: i32,
    },

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("execution timed out after {0} seconds")]
    Timeout(u64),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
