//! Process-local in-flight task counter used for termination detection
//!
//! The counter is best-effort bookkeeping, not part of the durable state. A
//! worker claims a slot *before* it asks the queue for work and keeps it until
//! the task (including enqueueing its children) is finished. A worker that
//! finds the queue empty releases its slot and then reads the counter: zero
//! means nobody holds a task that could still produce work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared counter of tasks currently being worked on
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    count: Arc<AtomicUsize>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a slot; it is released when the returned guard is dropped
    pub fn claim(&self) -> InFlightSlot {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightSlot {
            count: Arc::clone(&self.count),
        }
    }

    /// Number of currently claimed slots
    pub fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Returns true if no worker holds a slot
    pub fn is_idle(&self) -> bool {
        self.current() == 0
    }
}

/// RAII guard for one claimed in-flight slot
#[derive(Debug)]
pub struct InFlightSlot {
    count: Arc<AtomicUsize>,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }
}
