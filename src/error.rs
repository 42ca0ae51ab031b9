//! Error types for rulechat.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A mutation was rejected because a required text field was empty.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
