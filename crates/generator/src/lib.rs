//! Generation seam between the pipeline and the remote service
//!
//! Defines the `Generator` trait that decouples the worker pool from the
//! actual remote call. A generator turns one `WorkUnit` into an `Artifact`
//! using a single credential, and reports failures as a tagged
//! `GenerateError` so the pipeline can decide between credential rotation
//! (quota) and dropping the unit (anything else).

pub mod blocking;
pub mod quota;

pub use blocking::BlockingGenerator;
pub use quota::{classify, classify_status, classify_text};

use common::Secret;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

/// One unit of input and the location its artifact should be written to.
///
/// Units are immutable. A retry re-inserts the same unit into the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Stable identity used in logs and the final report (e.g. `block12.txt`)
    pub id: String,
    /// Text to generate from. Trimmed-empty content is skipped without a call.
    pub content: String,
    /// Designated output location for the artifact
    pub output: PathBuf,
    /// Where the content was read from, if it came from a file
    pub source: Option<PathBuf>,
}

impl WorkUnit {
    pub fn new(id: impl Into<String>, content: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            output: output.into(),
            source: None,
        }
    }

    /// Attach the file this unit was read from.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// True when there is nothing to send to the remote service.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Where a successful generation left its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub location: PathBuf,
}

/// Failure of a single generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    /// The service explicitly reported the credential's allowance as exhausted
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Non-success HTTP status from the service
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The call did not finish within the configured per-call timeout
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failures, malformed responses, local I/O, panics
    #[error("{0}")]
    Other(String),
}

/// Result alias for generation attempts.
pub type Result<T> = std::result::Result<T, GenerateError>;

/// How the pipeline should treat a failed attempt.
///
/// - `QuotaExceeded` rotates to the next credential and requeues the unit
/// - `NonQuota` drops the unit; it is logged and never retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    QuotaExceeded,
    NonQuota,
}

/// Abstraction over the remote generation call.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Generator>`).
/// The pipeline runs every call on its own tokio task, so a generator may
/// await for as long as the service takes without stalling other workers.
/// Synchronous clients should be wrapped in [`BlockingGenerator`].
pub trait Generator: Send + Sync {
    /// Identifier for logging (e.g. "http", "tts")
    fn id(&self) -> &str;

    /// Produce the artifact for `unit` using `credential`.
    fn generate<'a>(
        &'a self,
        credential: &'a Secret<String>,
        unit: &'a WorkUnit,
    ) -> Pin<Box<dyn Future<Output = Result<Artifact>> + Send + 'a>>;

    /// Classify a failed attempt. Defaults to the 429 / resource-exhausted heuristic.
    fn classify_error(&self, error: &GenerateError) -> Classification {
        quota::classify(error)
    }
}
