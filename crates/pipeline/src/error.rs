//! Error types for pipeline runs

/// Errors that prevent a run from starting.
///
/// Failures of individual units are never errors at this level: they end up
/// as dropped or still-queued entries in the `RunReport`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Pool(#[from] key_pool::Error),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
