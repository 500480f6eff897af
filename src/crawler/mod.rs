//! Crawler module for fetching and mirroring a site
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching and Content-Type classification
//! - HTML link extraction
//! - The per-task worker pipeline
//! - Worker pool coordination and termination
//! - The complete crawl run tying them to the task store

mod coordinator;
mod fetcher;
mod parser;
mod worker;

pub use coordinator::{
    cancel_pair, spawn_workers, CancelHandle, CancelSignal, PoolMonitor, PoolReport, WorkerPool,
};
pub use fetcher::{
    allowed_extensions, classify_content_type, normalize_content_type, FetchResult, Fetcher,
    ALLOWED_CONTENT_TYPES,
};
pub use parser::{extract_links, resolve_same_site, LINK_ATTRIBUTES};
pub use worker::{TaskCounts, WorkerExit, WorkerReport};

use crate::config::{ConsistencyMode, RuntimeSettings};
use crate::output::{sweep_stale_temps, PidLock};
use crate::storage::{RunStatus, SqliteTaskStore, StorageError, Task, TaskStore};
use crate::MirrorError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How often a running crawl logs its progress
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Opens the task store at `location`, seeding it with `seed` if it has no
/// pending work
///
/// This is the only fatal failure of a crawl run.
pub fn open_queue(
    location: &Path,
    seed: &Task,
    mode: ConsistencyMode,
) -> Result<SqliteTaskStore, MirrorError> {
    let store = SqliteTaskStore::open(location, seed, mode)?;
    tracing::info!("Opened task store at {} ({} mode)", location.display(), mode);
    Ok(store)
}

/// Closes a shared task store
///
/// Fails with [`StorageError::StillInUse`] while any worker still holds it.
pub fn close_queue(store: Arc<SqliteTaskStore>) -> Result<(), MirrorError> {
    match Arc::try_unwrap(store) {
        Ok(store) => {
            store.close()?;
            Ok(())
        }
        Err(shared) => Err(StorageError::StillInUse(Arc::strong_count(&shared) - 1).into()),
    }
}

/// Runs a complete crawl
///
/// This is the main entry point for mirroring a site. It will:
/// 1. Create the crawl root and take its pid lock
/// 2. Remove `.temp` files left by an interrupted run
/// 3. Open (or resume) the task store and record a run
/// 4. Spawn the workers and wait until they drain the queue or are cancelled
/// 5. Record how the run ended and close the store
///
/// # Arguments
///
/// * `settings` - The resolved run settings
/// * `cancel` - Stops the workers once triggered
///
/// # Returns
///
/// * `Ok(PoolReport)` - How each worker stopped
/// * `Err(MirrorError)` - Setup failed before any worker ran
pub async fn crawl(
    settings: Arc<RuntimeSettings>,
    cancel: CancelSignal,
) -> Result<PoolReport, MirrorError> {
    settings.prepare_dirs()?;
    let _lock = PidLock::acquire(&settings.crawl_root)?;

    let swept = sweep_stale_temps(&settings.documents_root)?;
    if swept > 0 {
        tracing::warn!("Removed {} stale temp file(s) from an interrupted run", swept);
    }

    let seed = Task::from_url(&settings.start_url);
    let store = Arc::new(open_queue(&settings.store_path, &seed, settings.consistency)?);
    let run_id = store.begin_run(&settings.config_hash)?;
    tracing::info!(
        "Starting crawl run {} of {} with {} worker(s)",
        run_id,
        settings.target_domain,
        settings.workers
    );

    let fetcher = Fetcher::new(&settings)?;
    let start_time = std::time::Instant::now();

    let shared: Arc<dyn TaskStore> = Arc::clone(&store) as Arc<dyn TaskStore>;
    let pool = spawn_workers(cancel, Arc::clone(&shared), Arc::clone(&settings), fetcher);
    let progress = tokio::spawn(log_progress(pool.monitor(), shared, PROGRESS_INTERVAL));
    let report = pool.join().await;

    // Releases the reporter's store handle before close_queue
    progress.abort();
    let _ = progress.await;

    let status = if report.drained() {
        RunStatus::Completed
    } else {
        RunStatus::Interrupted
    };
    store.finish_run(run_id, status)?;

    match store.stats() {
        Ok(stats) => tracing::info!(
            "Crawl run {} {}: {} task(s) completed, {} abandoned, {} requeued in {:?}; {} processed, {} pending",
            run_id,
            status.to_db_string(),
            report.tasks_completed(),
            report.tasks_abandoned(),
            report.tasks_requeued(),
            start_time.elapsed(),
            stats.processed,
            stats.pending
        ),
        Err(e) => tracing::warn!("Could not read final queue stats: {}", e),
    }

    close_queue(store)?;
    Ok(report)
}

/// Logs queue sizes and worker activity every `every` until aborted
pub async fn log_progress(monitor: PoolMonitor, store: Arc<dyn TaskStore>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match store.stats() {
            Ok(stats) => tracing::info!(
                pending = stats.pending,
                processed = stats.processed,
                in_flight = monitor.in_flight(),
                busy = monitor.busy(),
                workers = monitor.len(),
                "Crawl progress"
            ),
            Err(e) => tracing::warn!("Could not read queue stats: {}", e),
        }
    }
}
