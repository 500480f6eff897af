//! Storage traits and error types
//!
//! This module defines the trait interface for task store backends and
//! associated error types.

use crate::state::ProcessedOutcome;
use crate::storage::{QueueStats, Task};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task store lock was poisoned by a panicking holder")]
    LockPoisoned,

    #[error("Task store is still shared by {0} other handle(s)")]
    StillInUse(usize),

    #[error("Run not found: {0}")]
    RunNotFound(i64),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result of an enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Task was appended to the pending list
    Added,

    /// Task is already pending, in flight, or processed; nothing changed
    AlreadyQueued,
}

/// Trait for durable task store implementations
///
/// Every operation is atomic with respect to concurrent callers; the
/// implementation does its own locking, so callers share it through an `Arc`
/// without any external lock.
pub trait TaskStore: Send + Sync {
    /// Appends a task to the pending list unless it is already pending or
    /// processed
    ///
    /// The membership checks and the insert happen in one transaction, so two
    /// workers discovering the same link concurrently cannot both enqueue it.
    fn enqueue(&self, task: &Task) -> StorageResult<Enqueued>;

    /// Pops the head of the pending list
    ///
    /// Returns `Ok(None)` when the list is empty. The task is *not* moved to
    /// the processed set; see [`TaskStore::mark_processed`].
    fn dequeue(&self) -> StorageResult<Option<Task>>;

    /// Puts a dequeued task back at the pending tail, releasing its claim
    ///
    /// Used when a task could not be worked on and should be retried later.
    /// A task that is already processed stays processed.
    fn requeue(&self, task: &Task) -> StorageResult<Enqueued>;

    /// Records that the task's fetch attempt concluded; idempotent
    fn mark_processed(&self, task: &Task, outcome: ProcessedOutcome) -> StorageResult<()>;

    /// Returns true if the task is in the processed set
    fn is_processed(&self, task: &Task) -> StorageResult<bool>;

    /// Counts of pending, claimed and processed tasks
    fn stats(&self) -> StorageResult<QueueStats>;
}
