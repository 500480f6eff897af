//! Site-Mirror: a resumable single-site web crawler
//!
//! This crate mirrors one web domain to local disk. A durable SQLite-backed
//! task queue decides what to fetch next and guarantees each URL is attempted
//! at most once across restarts, while a fixed pool of workers fetches,
//! stores and harvests links concurrently.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Site-Mirror operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid public suffix list {source_name}: {reason}")]
    PublicSuffixList { source_name: String, reason: String },

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Temp file {} already exists, another worker is writing the same document", path.display())]
    TempCollision { path: PathBuf },

    #[error("Processing of {task} panicked")]
    TaskPanicked { task: String },

    #[error("Another crawler (pid {pid}) holds the lock at {}", lock_path.display())]
    AlreadyRunning { pid: u32, lock_path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MirrorError {
    /// Wraps an IO error together with the path it happened on
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Site-Mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, ConsistencyMode, RuntimeSettings};
pub use crawler::{cancel_pair, close_queue, crawl, open_queue, spawn_workers, PoolReport};
pub use state::{ProcessedOutcome, WorkerState};
pub use storage::{SqliteTaskStore, Task, TaskStore};
pub use url::{canonicalize, canonicalize_with_base, domain_key};
