//! Global sliding-window rate limiter
//!
//! Admits at most `limit` requests in any trailing window of `window`
//! length, across every worker of a run. This is a polling limiter, not a
//! token bucket: a caller that finds the window full sleeps until the oldest
//! admission leaves the window and then re-evaluates from scratch. Several
//! callers may wake together; only as many as there are free slots get in and
//! the rest go back to sleep.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};

/// Lower bound on a computed wait, so a wait never rounds down to a busy loop.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Sliding-window limiter shared by all workers.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `limit` requests per `window`.
    ///
    /// Both must be non-zero: a zero limit would never admit anything.
    pub fn new(limit: usize, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(Error::InvalidConfig(
                "rate limit must be greater than 0".into(),
            ));
        }
        if window.is_zero() {
            return Err(Error::InvalidConfig(
                "rate limit window must be greater than 0".into(),
            ));
        }
        Ok(Self {
            limit,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(limit)),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Try to take a slot without waiting.
    ///
    /// On success the admission is recorded. Otherwise returns how long until
    /// the oldest admission leaves the window.
    pub async fn try_acquire(&self) -> std::result::Result<(), Duration> {
        let mut admitted = self.admitted.lock().await;
        let now = Instant::now();

        while let Some(oldest) = admitted.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if admitted.len() < self.limit {
            admitted.push_back(now);
            return Ok(());
        }

        let wait = admitted
            .front()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
            .unwrap_or(MIN_WAIT);
        Err(wait.max(MIN_WAIT))
    }

    /// Wait for a slot, then record the admission.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire().await {
                Ok(()) => return,
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "rate limit window full, waiting");
                    crate::metrics::record_rate_limit_wait(wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Admissions currently inside the window.
    pub async fn in_window(&self) -> usize {
        let admitted = self.admitted.lock().await;
        let now = Instant::now();
        admitted
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < self.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn zero_limit_is_rejected() {
        let err = RateLimiter::new(0, Duration::from_secs(60)).unwrap_err();
        assert!(err.to_string().contains("rate limit must be greater than 0"));
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(RateLimiter::new(3, Duration::ZERO).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_limit_immediately() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60)).unwrap();
        assert_eq!(limiter.limit(), 3);
        assert_eq!(limiter.window(), Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn full_window_reports_time_until_oldest_expires() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60)).unwrap();
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(15)).await;
        limiter.acquire().await;

        let wait = limiter.try_acquire().await.unwrap_err();
        assert_eq!(wait, Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn next_admission_waits_for_window_to_roll() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60)).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }

        limiter.acquire().await;
        assert!(
            start.elapsed() >= Duration::from_secs(60),
            "4th admission came after {:?}",
            start.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slots_free_one_by_one_as_admissions_age_out() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10)).unwrap();
        limiter.acquire().await;
        tokio::time::advance(Duration::from_secs(4)).await;
        limiter.acquire().await;

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.try_acquire().await.is_ok(), "first admission aged out");
        assert!(limiter.try_acquire().await.is_err(), "second still inside the window");
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_limit_in_any_window_under_contention() {
        let window = Duration::from_secs(10);
        let limit = 4;
        let limiter = Arc::new(RateLimiter::new(limit, window).unwrap());
        let admissions = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            let admissions = Arc::clone(&admissions);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                admissions.lock().await.push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut times = admissions.lock().await.clone();
        times.sort();
        assert_eq!(times.len(), 20);
        for (i, start) in times.iter().enumerate() {
            let in_window = times[i..]
                .iter()
                .take_while(|t| t.saturating_duration_since(*start) < window)
                .count();
            assert!(
                in_window <= limit,
                "{in_window} admissions within {window:?} starting at #{i}"
            );
        }
    }
}
