//! Error types for Hoist.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("build failed: {0}")]
    Build(String),

    #[error("push failed: {0}")]
    Push(String),

    #[error("cleanup failed: {0}")]
    Cleanup(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("not implemented: {0}")]
    Unimplemented(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Conflict(_) => "conflict",
            Error::Retrieval(_) => "retrieval",
            Error::Auth(_) => "auth",
            Error::Build(_) => "build",
            Error::Push(_) => "push",
            Error::Cleanup(_) => "cleanup",
            Error::NotFound(_) => "not_found",
            Error::Engine(_) => "engine",
            Error::Unimplemented(_) => "unimplemented",
            Error::Cancelled => "cancelled",
            Error::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
