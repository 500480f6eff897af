//! Worker loop state machine

use std::fmt;

/// The state of a single crawl worker
///
/// ```text
/// Idle -> Fetching -> Storing -> Extracting -> Idle
///            |           |                      ^
///            +-----------+----------------------+   (rejection / non-HTML)
/// Idle -> Done                                      (drained or cancelled)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Waiting for the next dequeue attempt
    Idle,

    /// Task dequeued, HTTP request in progress
    Fetching,

    /// Response received, materializing the document
    Storing,

    /// Document is HTML, harvesting links
    Extracting,

    /// Worker loop has exited
    Done,
}

impl WorkerState {
    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Idle, Fetching)
                | (Idle, Done)
                | (Fetching, Storing)
                | (Fetching, Extracting)
                | (Fetching, Idle)
                | (Storing, Extracting)
                | (Storing, Idle)
                | (Extracting, Idle)
        )
    }

    /// Returns true while the worker holds a task
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Fetching | Self::Storing | Self::Extracting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Storing => "storing",
            Self::Extracting => "extracting",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
