//! Session termination timer

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Armed deadline of a live session.
///
/// The session watcher sleeps until `deadline()`; dropping the timer
/// disarms it. `armed` counts live timers so callers can check that at
/// most one exists.
#[derive(Debug)]
pub struct TerminationTimer {
    deadline: Instant,
    armed: Arc<AtomicUsize>,
}

impl TerminationTimer {
    pub fn arm(duration: Duration, armed: Arc<AtomicUsize>) -> Self {
        armed.fetch_add(1, Ordering::SeqCst);
        Self {
            deadline: Instant::now() + duration,
            armed,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl Drop for TerminationTimer {
    fn drop(&mut self) {
        self.armed.fetch_sub(1, Ordering::SeqCst);
    }
}
