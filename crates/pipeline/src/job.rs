//! Job status tracking
//!
//! A `JobTracker` holds the externally visible state of every job a process
//! is running: status, a human readable message and a progress counter. It is
//! constructed explicitly and shared by `Arc`; a run receives a `JobHandle`
//! scoped to its own job id and reports through the `ProgressSink` trait.
//!
//! Status transitions: accepted → processing → complete | error. Progress only
//! ever increases.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info};

/// Externally visible job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Accepted,
    Processing,
    Complete,
    Error,
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Accepted => "accepted",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        }
    }
}

/// Snapshot of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobState {
    pub status: JobStatus,
    pub message: String,
    pub progress: f64,
}

/// Receiver of run progress. Must be callable from any worker concurrently.
pub trait ProgressSink: Send + Sync {
    /// Add `amount` to the progress counter. Called once per completed unit.
    fn increment(&self, amount: f64);

    /// Replace the status and message.
    fn set_state(&self, status: JobStatus, message: &str);
}

/// Registry of job states, keyed by job id.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<String, JobState>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job in the `accepted` state and return its id.
    pub fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id.clone(),
                JobState {
                    status: JobStatus::Accepted,
                    message: "Job accepted".to_string(),
                    progress: 0.0,
                },
            );
        info!(job_id = %id, "job accepted");
        id
    }

    /// Replace status and message of an existing job. Unknown ids are ignored.
    pub fn update(&self, job_id: &str, status: JobStatus, message: &str) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(job) = jobs.get_mut(job_id) {
            job.status = status;
            job.message = message.to_string();
            info!(job_id, status = status.label(), message, "job status updated");
        }
    }

    /// Increase a job's progress. Negative amounts are ignored.
    pub fn advance(&self, job_id: &str, amount: f64) {
        if amount <= 0.0 || amount.is_nan() {
            return;
        }
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(job) = jobs.get_mut(job_id) {
            job.progress += amount;
            debug!(job_id, progress = job.progress, "job progress");
        }
    }

    pub fn get(&self, job_id: &str) -> Option<JobState> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
    }

    /// Forget a finished job.
    pub fn remove(&self, job_id: &str) -> Option<JobState> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id)
    }

    /// A progress sink bound to one job.
    pub fn handle(self: &Arc<Self>, job_id: &str) -> JobHandle {
        JobHandle {
            tracker: Arc::clone(self),
            job_id: job_id.to_string(),
        }
    }
}

/// `ProgressSink` for a single job of a `JobTracker`.
#[derive(Debug, Clone)]
pub struct JobHandle {
    tracker: Arc<JobTracker>,
    job_id: String,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> Option<JobState> {
        self.tracker.get(&self.job_id)
    }
}

impl ProgressSink for JobHandle {
    fn increment(&self, amount: f64) {
        self.tracker.advance(&self.job_id, amount);
    }

    fn set_state(&self, status: JobStatus, message: &str) {
        self.tracker.update(&self.job_id, status, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_accepted_with_zero_progress() {
        let tracker = JobTracker::new();
        let id = tracker.create();
        let state = tracker.get(&id).unwrap();
        assert_eq!(state.status, JobStatus::Accepted);
        assert_eq!(state.progress, 0.0);
    }

    #[test]
    fn job_ids_are_unique() {
        let tracker = JobTracker::new();
        assert_ne!(tracker.create(), tracker.create());
    }

    #[test]
    fn update_replaces_status_and_message() {
        let tracker = JobTracker::new();
        let id = tracker.create();
        tracker.update(&id, JobStatus::Processing, "Step 2/3: Generating audio");

        let state = tracker.get(&id).unwrap();
        assert_eq!(state.status, JobStatus::Processing);
        assert_eq!(state.message, "Step 2/3: Generating audio");
    }

    #[test]
    fn progress_never_decreases() {
        let tracker = JobTracker::new();
        let id = tracker.create();
        tracker.advance(&id, 2.0);
        tracker.advance(&id, -5.0);
        tracker.advance(&id, f64::NAN);
        assert_eq!(tracker.get(&id).unwrap().progress, 2.0);
    }

    #[test]
    fn unknown_job_is_ignored() {
        let tracker = JobTracker::new();
        tracker.update("missing", JobStatus::Error, "nope");
        tracker.advance("missing", 1.0);
        assert!(tracker.get("missing").is_none());
    }

    #[test]
    fn remove_tears_down_job() {
        let tracker = JobTracker::new();
        let id = tracker.create();
        assert!(tracker.remove(&id).is_some());
        assert!(tracker.get(&id).is_none());
    }

    #[test]
    fn handle_reports_into_its_own_job() {
        let tracker = Arc::new(JobTracker::new());
        let first = tracker.create();
        let second = tracker.create();
        let handle = tracker.handle(&first);
        assert_eq!(handle.job_id(), first);

        handle.increment(1.0);
        handle.increment(1.0);
        handle.set_state(JobStatus::Complete, "done");

        assert_eq!(handle.state().unwrap().progress, 2.0);
        assert_eq!(tracker.get(&first).unwrap().status, JobStatus::Complete);
        assert_eq!(tracker.get(&second).unwrap().status, JobStatus::Accepted);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let tracker = Arc::new(JobTracker::new());
        let id = tracker.create();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = tracker.handle(&id);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        handle.increment(1.0);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(tracker.get(&id).unwrap().progress, 800.0);
    }

    #[test]
    fn state_serializes_lowercase_status() {
        let state = JobState {
            status: JobStatus::Processing,
            message: "working".into(),
            progress: 3.0,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["progress"], 3.0);
    }
}
