//! Adapter for synchronous generation clients.
//!
//! Runs the wrapped closure on tokio's blocking pool so a call that holds a
//! thread for the whole request never occupies a runtime worker thread.

use crate::{Artifact, GenerateError, Generator, Result, WorkUnit};
use common::Secret;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// Generator backed by a blocking closure `(credential, unit) -> Result<Artifact>`.
pub struct BlockingGenerator<F> {
    id: String,
    call: Arc<F>,
}

impl<F> BlockingGenerator<F>
where
    F: Fn(&str, &WorkUnit) -> Result<Artifact> + Send + Sync + 'static,
{
    pub fn new(id: impl Into<String>, call: F) -> Self {
        Self {
            id: id.into(),
            call: Arc::new(call),
        }
    }
}

impl<F> Generator for BlockingGenerator<F>
where
    F: Fn(&str, &WorkUnit) -> Result<Artifact> + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn generate<'a>(
        &'a self,
        credential: &'a Secret<String>,
        unit: &'a WorkUnit,
    ) -> Pin<Box<dyn Future<Output = Result<Artifact>> + Send + 'a>> {
        let call = Arc::clone(&self.call);
        let credential = credential.clone();
        let unit = unit.clone();
        Box::pin(async move {
            debug!(unit = %unit.id, "dispatching to blocking pool");
            tokio::task::spawn_blocking(move || call(credential.expose(), &unit))
                .await
                .map_err(|e| GenerateError::Other(format!("blocking generation task failed: {e}")))?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Classification;

    #[tokio::test]
    async fn runs_closure_with_exposed_credential() {
        let generator = BlockingGenerator::new("sync", |key: &str, unit: &WorkUnit| {
            assert_eq!(key, "key-0001");
            Ok(Artifact {
                location: unit.output.clone(),
            })
        });
        let credential = Secret::new("key-0001".to_string());
        let unit = WorkUnit::new("b1", "hello", "/out/b1.wav");

        let artifact = generator.generate(&credential, &unit).await.unwrap();
        assert_eq!(artifact.location, unit.output);
        assert_eq!(generator.id(), "sync");
    }

    #[tokio::test]
    async fn propagates_closure_error() {
        let generator = BlockingGenerator::new("sync", |_: &str, _: &WorkUnit| {
            Err(GenerateError::ResourceExhausted("quota".into()))
        });
        let credential = Secret::new("k".to_string());
        let unit = WorkUnit::new("b1", "hello", "/out/b1.wav");

        let err = generator.generate(&credential, &unit).await.unwrap_err();
        assert_eq!(generator.classify_error(&err), Classification::QuotaExceeded);
    }

    #[tokio::test]
    async fn panic_in_closure_becomes_other_error() {
        let generator = BlockingGenerator::new("sync", |_: &str, _: &WorkUnit| -> Result<Artifact> {
            panic!("client blew up")
        });
        let credential = Secret::new("k".to_string());
        let unit = WorkUnit::new("b1", "hello", "/out/b1.wav");

        let err = generator.generate(&credential, &unit).await.unwrap_err();
        assert!(matches!(err, GenerateError::Other(_)), "got: {err:?}");
        assert_eq!(generator.classify_error(&err), Classification::NonQuota);
    }
}
