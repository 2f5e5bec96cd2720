//! Harness error type.

use thiserror::Error;

pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// `--capacity` was not a number in `1..=16 MiB`.
    #[error("invalid buffer capacity {0:?}")]
    InvalidCapacity(String),
    #[error("{failed} of {total} scenarios failed")]
    Failed { failed: usize, total: usize },
}
