//! Statistics generation from the task store
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::state::ProcessedOutcome;
use crate::storage::{RunRecord, SqliteTaskStore, TaskStore};
use crate::MirrorError;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Tasks waiting in the pending list
    pub pending: u64,

    /// Tasks dequeued by an unfinished run (journaled mode)
    pub claimed: u64,

    /// Tasks whose fetch attempt concluded
    pub processed: u64,

    /// Count of processed tasks by outcome
    pub by_outcome: HashMap<ProcessedOutcome, u64>,

    /// Number of runs recorded against this crawl root
    pub total_runs: u64,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl CrawlStatistics {
    /// Processed tasks that left a document on disk
    pub fn documents(&self) -> u64 {
        self.count_where(ProcessedOutcome::is_success)
    }

    /// Processed tasks that ended without a document
    pub fn rejected(&self) -> u64 {
        self.count_where(ProcessedOutcome::is_rejection)
    }

    fn count_where(&self, keep: fn(&ProcessedOutcome) -> bool) -> u64 {
        ProcessedOutcome::all()
            .iter()
            .filter(|outcome| keep(outcome))
            .map(|outcome| self.by_outcome.get(outcome).copied().unwrap_or(0))
            .sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The task store to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(MirrorError)` - Failed to query statistics
pub fn load_statistics(store: &SqliteTaskStore) -> Result<CrawlStatistics, MirrorError> {
    let queue = store.stats()?;
    let total_runs = store.count_runs()?;
    let latest_run = store.latest_run()?;

    Ok(CrawlStatistics {
        pending: queue.pending,
        claimed: queue.claimed,
        processed: queue.processed,
        by_outcome: queue.by_outcome,
        total_runs,
        latest_run,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Queue:");
    println!("  Pending: {}", stats.pending);
    if stats.claimed > 0 {
        println!("  Claimed by an interrupted run: {}", stats.claimed);
    }
    println!("  Processed: {}", stats.processed);
    println!();

    println!("Processed by Outcome:");
    // Sort outcomes by count (descending)
    let mut outcome_counts: Vec<_> = stats.by_outcome.iter().collect();
    outcome_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (outcome, count) in outcome_counts {
        let percentage = if stats.processed > 0 {
            (*count as f64 / stats.processed as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", outcome, count, percentage);
    }
    println!();

    println!("Runs: {}", stats.total_runs);
    if let Some(run) = &stats.latest_run {
        println!(
            "  Latest: #{} {} (started {}, finished {})",
            run.id,
            run.status.to_db_string(),
            run.started_at,
            run.finished_at.as_deref().unwrap_or("-")
        );
    }
    println!();

    let documents = stats.documents();
    let success_rate = if stats.processed > 0 {
        (documents as f64 / stats.processed as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} tasks left a document on disk)",
        success_rate, documents, stats.processed
    );
    println!("Rejected: {} (not retried on later runs)", stats.rejected());
}
