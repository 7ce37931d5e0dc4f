use std::path::PathBuf;

use fileindex::IndexError;

/// Errors that stop the service from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("base directory does not exist: {0}")]
    BaseDirMissing(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Result type alias using [`ServerError`].
pub type ServerResult<T> = Result<T, ServerError>;
