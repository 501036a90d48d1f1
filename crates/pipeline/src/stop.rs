//! Cooperative stop flag shared by all workers of a run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set once every key in the pool is exhausted.
///
/// Workers check it before dispatching a unit; in-flight calls are never
/// interrupted. The flag cannot be cleared.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns true if this call raised it.
    pub fn set(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_visible_through_clones() {
        let stop = StopSignal::new();
        let observer = stop.clone();
        assert!(!observer.is_set());

        assert!(stop.set());
        assert!(observer.is_set());
    }

    #[test]
    fn second_set_reports_already_raised() {
        let stop = StopSignal::new();
        assert!(stop.set());
        assert!(!stop.set());
        assert!(stop.is_set());
    }
}
