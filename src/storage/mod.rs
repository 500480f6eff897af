//! Storage module for the durable task queue
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - The FIFO pending list with set semantics
//! - The processed set that survives restarts
//! - Claims for the journaled consistency mode
//! - Run tracking and resumption support

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteTaskStore;
pub use traits::{Enqueued, StorageError, StorageResult, TaskStore};

use crate::state::ProcessedOutcome;
use crate::UrlError;
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// A unit of crawl work: one canonical absolute URL
///
/// The string itself is the task identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Task(String);

impl Task {
    /// Creates a task from an already canonicalized URL
    pub fn from_url(url: &Url) -> Self {
        Self(url.as_str().to_string())
    }

    /// Canonicalizes `raw` and wraps it as a task
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        crate::url::canonicalize(raw).map(|url| Self::from_url(&url))
    }

    /// Wraps a string read back from the store
    pub(crate) fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the task back into a URL
    pub fn to_url(&self) -> Result<Url, UrlError> {
        Url::parse(&self.0).map_err(|e| UrlError::Parse(format!("{}: {}", self.0, e)))
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Task {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Snapshot of the task store's collections
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    /// Tasks waiting in the pending list
    pub pending: u64,

    /// Tasks dequeued but not yet processed (journaled mode only)
    pub claimed: u64,

    /// Tasks in the processed set
    pub processed: u64,

    /// Processed tasks broken down by outcome
    pub by_outcome: HashMap<ProcessedOutcome, u64>,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
