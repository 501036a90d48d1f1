//! Per-worker loop
//!
//! Each worker repeatedly takes one entry from the shared queue, turns it
//! into an `Outcome`, and settles the outcome with exactly one `ack`. All
//! failure handling happens inside `process`, which never returns early
//! without an outcome, so the single `ack` in the loop body covers every path.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use generator::{Artifact, Classification, GenerateError, Generator, WorkUnit};
use key_pool::{ActiveKey, CredentialPool};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::job::ProgressSink;
use crate::queue::{Entry, WorkQueue};
use crate::rate_limit::RateLimiter;
use crate::runner::DroppedUnit;
use crate::stop::StopSignal;

/// Why a taken unit goes back into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Requeue {
    /// The key used for the attempt hit its quota
    QuotaFailure,
    /// No key left, or the run was already halting
    KeysExhausted,
}

/// How one taken unit was handled.
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed(Artifact),
    SkippedEmpty,
    Requeued(Requeue),
    Dropped(String),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Completed(_) => "completed",
            Outcome::SkippedEmpty => "skipped_empty",
            Outcome::Requeued(Requeue::QuotaFailure) => "requeued_quota",
            Outcome::Requeued(Requeue::KeysExhausted) => "requeued_exhausted",
            Outcome::Dropped(_) => "dropped",
        }
    }
}

/// Terminal counts shared by all workers of a run.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub completed: Mutex<Vec<String>>,
    pub skipped_empty: Mutex<Vec<String>>,
    pub dropped: Mutex<Vec<DroppedUnit>>,
    pub requeues: AtomicUsize,
}

/// Everything a worker needs, shared by reference with its siblings.
#[derive(Clone)]
pub(crate) struct Shared {
    pub queue: Arc<WorkQueue<Arc<WorkUnit>>>,
    pub pool: Arc<CredentialPool>,
    pub permits: Arc<Semaphore>,
    pub limiter: Arc<RateLimiter>,
    pub stop: StopSignal,
    pub generator: Arc<dyn Generator>,
    pub sink: Arc<dyn ProgressSink>,
    pub tally: Arc<Tally>,
    pub call_timeout: Option<Duration>,
}

pub(crate) struct Worker {
    name: String,
    shared: Shared,
}

impl Worker {
    pub fn new(name: String, shared: Shared) -> Self {
        Self { name, shared }
    }

    /// Drain the queue until a stop marker arrives.
    pub async fn run(self) {
        debug!(worker = %self.name, "worker started");
        loop {
            let unit = match self.shared.queue.take().await {
                Entry::Stop => {
                    self.shared.queue.ack().await;
                    break;
                }
                Entry::Task(unit) => unit,
            };

            let outcome = self.process(&unit).await;
            self.settle(unit, outcome).await;
        }
        debug!(worker = %self.name, "worker stopped");
    }

    async fn process(&self, unit: &Arc<WorkUnit>) -> Outcome {
        if self.shared.stop.is_set() {
            debug!(worker = %self.name, unit = %unit.id, "run halting, leaving unit queued");
            return Outcome::Requeued(Requeue::KeysExhausted);
        }

        if unit.is_empty() {
            warn!(worker = %self.name, unit = %unit.id, "unit is empty, skipping");
            return Outcome::SkippedEmpty;
        }

        let Some(key) = self.shared.pool.current().await else {
            warn!(
                worker = %self.name,
                unit = %unit.id,
                "all keys exhausted, requeueing unit and signalling stop"
            );
            self.halt().await;
            return Outcome::Requeued(Requeue::KeysExhausted);
        };

        // Moves into the call task and is released only when the call returns
        let permit = match Arc::clone(&self.shared.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(worker = %self.name, unit = %unit.id, error = %e, "call permits closed, dropping unit");
                return Outcome::Dropped(format!("call permits unavailable: {e}"));
            }
        };
        self.shared.limiter.acquire().await;

        info!(
            worker = %self.name,
            unit = %unit.id,
            key_number = key.index + 1,
            key = %key.credential.suffix(),
            "generating"
        );

        let started = Instant::now();
        let result = self.call(&key, unit, permit).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(artifact) => {
                crate::metrics::record_generate_duration("ok", elapsed);
                self.shared.sink.increment(1.0);
                Outcome::Completed(artifact)
            }
            Err(err) => match self.shared.generator.classify_error(&err) {
                Classification::QuotaExceeded => {
                    crate::metrics::record_generate_duration("quota", elapsed);
                    warn!(
                        worker = %self.name,
                        unit = %unit.id,
                        key_number = key.index + 1,
                        error = %first_line(&err),
                        "quota error, requeueing unit"
                    );
                    self.shared.pool.report_failure(key.index).await;
                    Outcome::Requeued(Requeue::QuotaFailure)
                }
                Classification::NonQuota => {
                    crate::metrics::record_generate_duration("error", elapsed);
                    error!(
                        worker = %self.name,
                        unit = %unit.id,
                        error = %err,
                        "non-quota error, dropping unit"
                    );
                    Outcome::Dropped(err.to_string())
                }
            },
        }
    }

    /// Run the generation call on its own task so a slow or panicking
    /// generator cannot take the worker down with it.
    ///
    /// The permit lives inside that task. On timeout the task is detached,
    /// not aborted: a blocking call cannot be interrupted, so it keeps its
    /// permit until it actually returns.
    async fn call(
        &self,
        key: &ActiveKey,
        unit: &Arc<WorkUnit>,
        permit: OwnedSemaphorePermit,
    ) -> Result<Artifact, GenerateError> {
        let generator = Arc::clone(&self.shared.generator);
        let credential = key.credential.clone();
        let unit = Arc::clone(unit);
        let mut handle = tokio::spawn(async move {
            let _permit = permit;
            generator.generate(&credential, &unit).await
        });

        let joined = match self.shared.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        worker = %self.name,
                        timeout_secs = limit.as_secs_f64(),
                        "call timed out, leaving it to finish in the background"
                    );
                    return Err(GenerateError::Timeout(limit));
                }
            },
            None => handle.await,
        };

        joined.unwrap_or_else(|e| Err(GenerateError::Other(format!("generation task failed: {e}"))))
    }

    async fn halt(&self) {
        if self.shared.stop.set() {
            warn!(worker = %self.name, "stop signal raised, no further units will be dispatched");
        }
        self.shared.queue.halt().await;
    }

    /// Record the outcome, requeue if needed, then acknowledge the take.
    async fn settle(&self, unit: Arc<WorkUnit>, outcome: Outcome) {
        crate::metrics::record_outcome(outcome.label());
        let tally = &self.shared.tally;
        match outcome {
            Outcome::Completed(artifact) => {
                info!(
                    worker = %self.name,
                    unit = %unit.id,
                    artifact = %artifact.location.display(),
                    "unit ready"
                );
                tally.completed.lock().await.push(unit.id.clone());
            }
            Outcome::SkippedEmpty => {
                tally.skipped_empty.lock().await.push(unit.id.clone());
            }
            Outcome::Requeued(_) => {
                tally.requeues.fetch_add(1, Ordering::Relaxed);
                self.shared.queue.put(unit).await;
            }
            Outcome::Dropped(error) => {
                tally.dropped.lock().await.push(DroppedUnit {
                    id: unit.id.clone(),
                    error,
                });
            }
        }
        self.shared.queue.ack().await;
    }
}

/// First line of an error message, for compact quota logs.
fn first_line(err: &GenerateError) -> String {
    err.to_string().lines().next().unwrap_or_default().to_string()
}
