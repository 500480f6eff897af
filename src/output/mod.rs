//! Output module for everything the crawler leaves on disk
//!
//! This module handles:
//! - Mapping URLs to document paths under the documents root
//! - Crash-safe document writes (temp file, then atomic rename)
//! - The single-instance pid lock of a crawl root
//! - Reading and printing crawl statistics

mod layout;
mod lock;
pub mod stats;
mod writer;

pub use layout::{temp_path, DocumentPath, ROOT_FILENAME, TEMP_SUFFIX};
pub use lock::{PidLock, LOCK_FILENAME};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use writer::{
    existing_document, materialize, sweep_stale_temps, ExistingDocument, WriteOutcome,
};
