//! Service-specific error types

use thiserror::Error;

/// Batch runner errors.
///
/// Per-unit failures never surface here; the pipeline records them in its
/// report. These cover setup and the final verdict of a run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("run incomplete: {unprocessed} unit(s) left unprocessed, {dropped} dropped")]
    Incomplete { unprocessed: usize, dropped: usize },
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
