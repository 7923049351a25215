//! Progress reporting and cancellation.
//!
//! Every long running operation receives a `Task`. The operation reports
//! what it is doing and how far it has got, and polls `is_cancelled` at
//! each flight, peak, line or subprocess boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{info, warn};

pub trait Task: Send + Sync {
    fn update_message(&self, message: &str);

    fn update_progress(&self, done: usize, total: usize);

    fn is_cancelled(&self) -> bool;

    /// Record a non fatal problem against the run.
    fn add_warning(&self, warning: &str);
}

/// A thread safe task that logs its messages and keeps the warnings.
#[derive(Debug, Default)]
pub struct Tracker {
    cancelled: AtomicBool,
    warnings: Mutex<Vec<String>>,
    progress: Mutex<(usize, usize)>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn warnings(&self) -> Vec<String> {
        match self.warnings.lock() {
            Ok(warnings) => warnings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Last reported progress as (done, total).
    pub fn progress(&self) -> (usize, usize) {
        match self.progress.lock() {
            Ok(progress) => *progress,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Task for Tracker {
    fn update_message(&self, message: &str) {
        info!("{}", message);
    }

    fn update_progress(&self, done: usize, total: usize) {
        if let Ok(mut progress) = self.progress.lock() {
            *progress = (done, total);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn add_warning(&self, warning: &str) {
        warn!("{}", warning);
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(warning.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_keeps_warnings_in_order() {
        let tracker = Tracker::new();
        tracker.add_warning("first");
        tracker.add_warning("second");

        assert_eq!(tracker.warnings(), vec!["first", "second"]);
    }

    #[test]
    fn tracker_cancel_is_sticky() {
        let tracker = Tracker::new();
        assert!(!tracker.is_cancelled());
        tracker.cancel();
        assert!(tracker.is_cancelled());
        assert!(tracker.is_cancelled());
    }
}
