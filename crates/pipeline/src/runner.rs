//! Run orchestration and shutdown protocol
//!
//! States of a run, in order:
//! - `Running`: workers draining the queue
//! - `Draining`: every submitted unit settled (or parked by a halt)
//! - `ShuttingDown`: one stop marker queued per worker
//! - `Stopped`: every worker has exited
//!
//! At `Stopped` an empty queue means the run finished every unit; anything
//! still queued was left behind because all keys were exhausted.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::Secret;
use generator::{Generator, WorkUnit};
use key_pool::CredentialPool;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::job::{JobStatus, ProgressSink};
use crate::queue::WorkQueue;
use crate::rate_limit::RateLimiter;
use crate::stop::StopSignal;
use crate::worker::{Shared, Tally, Worker};

/// Global admission ceiling: `limit` calls per rolling `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: usize,
    pub window: Duration,
}

/// Tuning for one run.
///
/// `workers` bounds how many loops pull from the queue; `concurrency` bounds
/// how many generation calls are in flight at once. They are usually equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub workers: usize,
    pub concurrency: usize,
    pub rate_limit: RateLimit,
    /// Give up on a call after this long and drop its unit. `None` waits
    /// indefinitely. A timed-out call is left running rather than cancelled,
    /// and keeps its concurrency permit until it returns.
    pub call_timeout: Option<Duration>,
}

impl PipelineConfig {
    /// `workers` loops with an equal number of call permits and no call timeout.
    pub fn new(workers: usize, rate_limit: RateLimit) -> Self {
        Self {
            workers,
            concurrency: workers,
            rate_limit,
            call_timeout: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be greater than 0".into()));
        }
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig(
                "concurrency must be greater than 0".into(),
            ));
        }
        if self.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidConfig(
                "call timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Draining,
    ShuttingDown,
    Stopped,
}

impl RunState {
    pub fn label(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Draining => "draining",
            RunState::ShuttingDown => "shutting_down",
            RunState::Stopped => "stopped",
        }
    }
}

/// A unit abandoned after a non-quota failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedUnit {
    pub id: String,
    pub error: String,
}

/// Final accounting of a run.
///
/// `completed + dropped + skipped_empty + still_queued == submitted`.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub submitted: usize,
    pub completed: Vec<String>,
    pub dropped: Vec<DroppedUnit>,
    pub skipped_empty: Vec<String>,
    /// Units left in the queue because every key was exhausted
    pub still_queued: Vec<WorkUnit>,
    /// Total requeues over the run, including quota retries
    pub requeues: usize,
    /// Whether the run stopped dispatching because all keys were exhausted
    pub keys_exhausted: bool,
}

impl RunReport {
    /// Every submitted unit reached a terminal outcome.
    pub fn is_complete(&self) -> bool {
        self.still_queued.is_empty()
    }

    /// Terminal units: completed, dropped or skipped.
    pub fn settled(&self) -> usize {
        self.completed.len() + self.dropped.len() + self.skipped_empty.len()
    }
}

/// One pipeline run: a credential pool, a generator and a queue of units.
pub struct Pipeline {
    pool: Arc<CredentialPool>,
    generator: Arc<dyn Generator>,
    sink: Arc<dyn ProgressSink>,
    queue: Arc<WorkQueue<Arc<WorkUnit>>>,
    submitted: usize,
}

impl Pipeline {
    pub fn new(
        pool: CredentialPool,
        generator: Arc<dyn Generator>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            pool: Arc::new(pool),
            generator,
            sink,
            queue: Arc::new(WorkQueue::new()),
            submitted: 0,
        }
    }

    /// Build the credential pool from `keys`, in order. Blank keys are
    /// discarded; fails when none remain.
    pub fn from_keys(
        keys: Vec<Secret<String>>,
        generator: Arc<dyn Generator>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self> {
        Ok(Self::new(CredentialPool::new(keys)?, generator, sink))
    }

    /// Queue units in order. Returns the total submitted so far.
    pub async fn submit(&mut self, units: impl IntoIterator<Item = WorkUnit>) -> usize {
        for unit in units {
            self.queue.put(Arc::new(unit)).await;
            self.submitted += 1;
        }
        self.submitted
    }

    /// The credential pool used by this run.
    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Process every submitted unit and return the final report.
    ///
    /// Returns only after every worker has exited. Unit failures never make
    /// this fail; only an invalid configuration does.
    pub async fn run(self, config: &PipelineConfig) -> Result<RunReport> {
        config.validate()?;
        let limiter = RateLimiter::new(config.rate_limit.limit, config.rate_limit.window)?;

        let tally = Arc::new(Tally::default());
        let stop = StopSignal::new();
        let shared = Shared {
            queue: Arc::clone(&self.queue),
            pool: Arc::clone(&self.pool),
            permits: Arc::new(Semaphore::new(config.concurrency)),
            limiter: Arc::new(limiter),
            stop: stop.clone(),
            generator: Arc::clone(&self.generator),
            sink: Arc::clone(&self.sink),
            tally: Arc::clone(&tally),
            call_timeout: config.call_timeout,
        };

        info!(
            units = self.submitted,
            keys = self.pool.len(),
            workers = config.workers,
            concurrency = config.concurrency,
            rate_limit = shared.limiter.limit(),
            window_secs = shared.limiter.window().as_secs_f64(),
            generator = self.generator.id(),
            "starting run"
        );
        self.sink.set_state(
            JobStatus::Processing,
            &format!("Generating {} unit(s)", self.submitted),
        );

        let mut state = RunState::Running;
        let handles: Vec<_> = (0..config.workers)
            .map(|i| {
                let worker = Worker::new(format!("worker-{}", i + 1), shared.clone());
                tokio::spawn(worker.run())
            })
            .collect();

        self.queue.join().await;
        state = transition(state, RunState::Draining);

        for _ in 0..handles.len() {
            self.queue.put_stop().await;
        }
        state = transition(state, RunState::ShuttingDown);

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task failed");
            }
        }
        transition(state, RunState::Stopped);

        let still_queued: Vec<WorkUnit> = self
            .queue
            .drain_tasks()
            .await
            .into_iter()
            .map(Arc::unwrap_or_clone)
            .collect();

        let report = RunReport {
            submitted: self.submitted,
            completed: std::mem::take(&mut *tally.completed.lock().await),
            dropped: std::mem::take(&mut *tally.dropped.lock().await),
            skipped_empty: std::mem::take(&mut *tally.skipped_empty.lock().await),
            still_queued,
            requeues: tally.requeues.load(Ordering::Relaxed),
            keys_exhausted: stop.is_set(),
        };

        self.finish(&report);
        Ok(report)
    }

    fn finish(&self, report: &RunReport) {
        if report.is_complete() {
            info!(
                completed = report.completed.len(),
                dropped = report.dropped.len(),
                skipped_empty = report.skipped_empty.len(),
                requeues = report.requeues,
                "run finished, every unit processed"
            );
            self.sink.set_state(
                JobStatus::Complete,
                &format!(
                    "Processed {} unit(s): {} completed, {} dropped, {} empty",
                    report.submitted,
                    report.completed.len(),
                    report.dropped.len(),
                    report.skipped_empty.len()
                ),
            );
        } else {
            warn!(
                completed = report.completed.len(),
                unprocessed = report.still_queued.len(),
                "run stopped because all keys were exhausted"
            );
            for unit in &report.still_queued {
                warn!(unit = %unit.id, "unit not processed");
            }
            self.sink.set_state(
                JobStatus::Error,
                &format!(
                    "All API keys exhausted; {} unit(s) could not be processed",
                    report.still_queued.len()
                ),
            );
        }
    }
}

fn transition(from: RunState, to: RunState) -> RunState {
    info!(from = from.label(), to = to.label(), "run state");
    to
}
