//! Bounded-concurrency generation pipeline
//!
//! Drives a batch of work units through a quota-limited remote service. A
//! fixed set of worker tasks drains a FIFO queue; every attempt passes a
//! concurrency permit and a global sliding-window rate limiter, uses the
//! currently active key from the credential pool, and is classified on
//! failure:
//!
//! - quota failure → report the key, requeue the unit at the tail
//! - any other failure → log and drop the unit
//! - empty unit → skip without calling the service
//!
//! When the pool runs out of keys the queue is halted: remaining units stay
//! queued and are listed in the `RunReport` instead of being retried forever.
//!
//! Run lifecycle:
//! 1. `Pipeline::submit()` fills the queue
//! 2. `Pipeline::run()` spawns the workers and waits until every submitted
//!    unit is settled (or parked by a halt)
//! 3. One stop marker per worker is queued and all workers are joined
//! 4. Whatever is still queued goes into the report

pub mod error;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod rate_limit;
pub mod runner;
pub mod stop;
mod worker;

pub use error::{Error, Result};
pub use job::{JobHandle, JobState, JobStatus, JobTracker, ProgressSink};
pub use queue::{Entry, WorkQueue};
pub use rate_limit::RateLimiter;
pub use runner::{DroppedUnit, Pipeline, PipelineConfig, RateLimit, RunReport, RunState};
pub use stop::StopSignal;
