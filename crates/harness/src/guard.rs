//! Deadline guard
//!
//! Runs a unit of work on its own thread and races its completion against
//! a wall-clock deadline.
//!
//! # Semantics
//!
//! - Completion first: `Guarded::Completed` with the unit's own result.
//! - Deadline first: `Guarded::TimedOut`, returned immediately. The unit is
//!   neither waited for nor terminated; store operations offer no
//!   cancellation, so the thread is abandoned in place and whatever it holds
//!   (store handle, cursor, batch) stays alive until it returns, possibly
//!   for the rest of the process.
//! - Ties: a result that is already in the channel when the deadline is
//!   observed wins, so simultaneous readiness resolves as completion.
//! - A panic inside the unit becomes `Guarded::Crashed`.
//!
//! Abandoned units are counted process-wide (`abandoned_units`) and the
//! count drops when such a unit finally returns.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

static ABANDONED: AtomicUsize = AtomicUsize::new(0);

/// Number of timed-out units whose threads are still running
pub fn abandoned_units() -> usize {
    ABANDONED.load(Ordering::SeqCst)
}

/// Result of a guarded run
#[derive(Debug, PartialEq, Eq)]
pub enum Guarded<T> {
    /// The unit finished in time
    Completed(T),
    /// The deadline elapsed first; the unit was abandoned
    TimedOut {
        /// Configured bound
        deadline: Duration,
        /// Time actually waited
        elapsed: Duration,
    },
    /// The unit panicked or its thread could not be spawned
    Crashed(String),
}

impl<T> Guarded<T> {
    /// Whether the unit finished in time
    pub fn is_completed(&self) -> bool {
        matches!(self, Guarded::Completed(_))
    }
}

/// A single bounded-time envelope
#[derive(Debug, Clone)]
pub struct DeadlineGuard {
    label: String,
    deadline: Duration,
}

impl DeadlineGuard {
    /// Guard labelled `label` (used for the thread name and logs)
    pub fn new(label: impl Into<String>, deadline: Duration) -> Self {
        DeadlineGuard {
            label: label.into(),
            deadline,
        }
    }

    /// Configured bound
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run `unit` with this guard's deadline.
    pub fn run<F, T>(&self, unit: F) -> Guarded<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        // Set under this lock by the caller on timeout; checked under the
        // same lock by the worker before it reports.
        let abandoned = Arc::new(Mutex::new(false));
        let worker_abandoned = Arc::clone(&abandoned);
        let label = self.label.clone();

        let start = Instant::now();
        let spawned = thread::Builder::new()
            .name(format!("kvprobe-guard:{}", self.label))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(unit));
                let abandoned = worker_abandoned.lock();
                if *abandoned {
                    ABANDONED.fetch_sub(1, Ordering::SeqCst);
                    debug!(target: "kvprobe::guard", unit = %label, "Abandoned unit returned");
                } else {
                    let _ = tx.send(result);
                }
            });
        if let Err(e) = spawned {
            return Guarded::Crashed(format!("failed to spawn guarded unit: {}", e));
        }

        match rx.recv_timeout(self.deadline) {
            Ok(result) => finish(result),
            Err(RecvTimeoutError::Timeout) => {
                let mut flag = abandoned.lock();
                if let Ok(result) = rx.try_recv() {
                    return finish(result);
                }
                *flag = true;
                ABANDONED.fetch_add(1, Ordering::SeqCst);
                let elapsed = start.elapsed();
                warn!(
                    target: "kvprobe::guard",
                    unit = %self.label,
                    deadline = ?self.deadline,
                    elapsed = ?elapsed,
                    "Deadline elapsed, abandoning unit"
                );
                Guarded::TimedOut {
                    deadline: self.deadline,
                    elapsed,
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                Guarded::Crashed("guarded unit exited without reporting".to_string())
            }
        }
    }
}

fn finish<T>(result: thread::Result<T>) -> Guarded<T> {
    match result {
        Ok(value) => Guarded::Completed(value),
        Err(payload) => Guarded::Crashed(panic_message(payload.as_ref())),
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
