//! Crawl worker: the per-task pipeline and the loop around it
//!
//! Each worker repeatedly pauses, dequeues one task and runs it through:
//!
//! 1. map the URL to a document path
//! 2. if a document is already on disk, record it (rescanning HTML for links)
//! 3. fetch; a rejection is recorded and ends the task
//! 4. write `.temp`, rename into place, drop a marker for root URLs
//! 5. mark processed and, for HTML, enqueue same-site links
//!
//! Each task runs in its own spawned tokio task, so a panic anywhere in the
//! pipeline abandons only that task. A task whose `.temp` file is held by
//! another worker goes back on the queue instead; by the time it comes round
//! again the other worker's document is on disk.

use crate::config::{ConsistencyMode, RuntimeSettings};
use crate::crawler::coordinator::CancelSignal;
use crate::crawler::fetcher::{FetchResult, Fetcher};
use crate::crawler::parser::{extract_links, resolve_same_site};
use crate::output::{existing_document, materialize, DocumentPath, WriteOutcome};
use crate::state::{InFlight, ProcessedOutcome, WorkerState};
use crate::storage::{Enqueued, Task, TaskStore};
use crate::MirrorError;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;
use url::Url;

/// Shared handles every worker of a pool receives
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub store: Arc<dyn TaskStore>,
    pub settings: Arc<RuntimeSettings>,
    pub fetcher: Fetcher,
    pub in_flight: InFlight,
}

/// Why a worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Queue empty and nothing in flight anywhere
    Drained,

    /// Cancellation was requested
    Cancelled,

    /// The worker loop itself panicked
    Panicked,
}

/// Per-worker task tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    /// Tasks that reached the processed set
    pub completed: u64,

    /// Tasks dropped after an error; they stay out of the processed set
    pub abandoned: u64,

    /// Tasks put back on the queue because another worker was writing the
    /// same document
    pub requeued: u64,
}

/// What a worker reports when it stops
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub id: usize,
    pub exit: WorkerExit,
    pub tasks: TaskCounts,
}

pub(crate) struct Worker {
    id: usize,
    ctx: WorkerContext,
    cancel: CancelSignal,
    state: Arc<watch::Sender<WorkerState>>,
    tasks: TaskCounts,
}

impl Worker {
    pub fn new(
        id: usize,
        ctx: WorkerContext,
        cancel: CancelSignal,
        state: Arc<watch::Sender<WorkerState>>,
    ) -> Self {
        Self {
            id,
            ctx,
            cancel,
            state,
            tasks: TaskCounts::default(),
        }
    }

    pub async fn run(mut self) -> WorkerReport {
        tracing::info!("Worker started");
        let pause = self.ctx.settings.pause_between_jobs;

        let exit = loop {
            if self.cancel.is_cancelled() {
                break WorkerExit::Cancelled;
            }

            // Bounds contention on the store
            tokio::select! {
                _ = self.cancel.cancelled() => break WorkerExit::Cancelled,
                _ = tokio::time::sleep(pause) => {}
            }

            // Claimed before dequeue so a popped task is always counted
            let slot = self.ctx.in_flight.claim();
            let task = match self.ctx.store.dequeue() {
                Ok(Some(task)) => task,
                Ok(None) => {
                    drop(slot);
                    if self.ctx.in_flight.is_idle() {
                        tracing::info!("No work left and nothing in flight");
                        break WorkerExit::Drained;
                    }
                    tracing::trace!("Queue empty, {} task(s) in flight", self.ctx.in_flight.current());
                    continue;
                }
                Err(e) => {
                    tracing::error!("Dequeue failed: {}", e);
                    continue;
                }
            };

            tracing::info!(task = %task, "Worker got a task");
            transition(&self.state, WorkerState::Fetching);
            self.run_task(task).await;
            transition(&self.state, WorkerState::Idle);
            drop(slot);
        };

        transition(&self.state, WorkerState::Done);
        tracing::info!(
            "Worker done ({:?}): {} completed, {} abandoned, {} requeued",
            exit,
            self.tasks.completed,
            self.tasks.abandoned,
            self.tasks.requeued
        );

        WorkerReport {
            id: self.id,
            exit,
            tasks: self.tasks,
        }
    }

    /// Runs one task behind a spawn boundary
    async fn run_task(&mut self, task: Task) {
        let handle = tokio::spawn(
            process_task(self.ctx.clone(), task.clone(), Arc::clone(&self.state))
                .instrument(tracing::Span::current()),
        );

        match handle.await {
            Ok(Ok(outcome)) => {
                tracing::debug!(task = %task, outcome = %outcome, "Task processed");
                self.tasks.completed += 1;
            }
            Ok(Err(MirrorError::TempCollision { path })) => {
                tracing::warn!(
                    task = %task,
                    path = %path.display(),
                    "Another worker is writing this document, requeueing"
                );
                match self.ctx.store.requeue(&task) {
                    Ok(_) => self.tasks.requeued += 1,
                    Err(e) => {
                        tracing::error!(task = %task, "Requeue failed, abandoning task: {}", e);
                        self.tasks.abandoned += 1;
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::error!(task = %task, "Abandoning task: {}", e);
                self.tasks.abandoned += 1;
            }
            Err(join_error) => {
                let e = MirrorError::TaskPanicked {
                    task: task.to_string(),
                };
                tracing::error!(task = %task, "{}: {}", e, join_error);
                self.tasks.abandoned += 1;
            }
        }
    }
}

fn transition(state: &watch::Sender<WorkerState>, next: WorkerState) {
    let current = *state.borrow();
    if current == next {
        return;
    }
    debug_assert!(
        current.can_transition_to(next),
        "invalid worker transition {} -> {}",
        current,
        next
    );
    tracing::trace!("{} -> {}", current, next);
    state.send_replace(next);
}

/// Steps 1 through 5 for a single task
async fn process_task(
    ctx: WorkerContext,
    task: Task,
    state: Arc<watch::Sender<WorkerState>>,
) -> Result<ProcessedOutcome, MirrorError> {
    let url = task.to_url()?;
    let doc = DocumentPath::for_url(&ctx.settings.documents_root, &url);

    if let Some(existing) = existing_document(&doc) {
        tracing::debug!(path = %existing.path.display(), "Document already on disk, skipping fetch");

        let html = if existing.is_html {
            let body = tokio::fs::read(&existing.path)
                .await
                .map_err(|e| MirrorError::filesystem(&existing.path, e))?;
            Some(body)
        } else {
            None
        };

        finish(&ctx, &task, &url, ProcessedOutcome::AlreadyPresent, html.as_deref(), &state)?;
        return Ok(ProcessedOutcome::AlreadyPresent);
    }

    let fetched = ctx.fetcher.fetch(&url).await;
    let is_html = fetched.is_html();
    let (extension, body) = match fetched {
        FetchResult::Success {
            extension, body, ..
        } => (extension, body),
        FetchResult::HttpError { status_code } => {
            tracing::warn!(status_code, "Bad HTTP status");
            return reject(&ctx, &task, ProcessedOutcome::BadStatus);
        }
        FetchResult::ContentMismatch { content_type } => {
            tracing::warn!(content_type = %content_type, "Unsupported content type");
            return reject(&ctx, &task, ProcessedOutcome::UnsupportedContentType);
        }
        FetchResult::NetworkError { error } => {
            tracing::warn!(error = %error, "Network error");
            return reject(&ctx, &task, ProcessedOutcome::NetworkError);
        }
    };

    transition(&state, WorkerState::Storing);
    let outcome = match materialize(&doc, extension, &body)? {
        WriteOutcome::Stored(path) => {
            tracing::info!(path = %path.display(), bytes = body.len(), "Stored document");
            ProcessedOutcome::Stored
        }
        WriteOutcome::AlreadyPresent(path) => {
            tracing::info!(path = %path.display(), "Another task already stored this document");
            ProcessedOutcome::AlreadyPresent
        }
    };

    let html = is_html.then_some(body.as_slice());
    finish(&ctx, &task, &url, outcome, html, &state)?;
    Ok(outcome)
}

fn reject(
    ctx: &WorkerContext,
    task: &Task,
    outcome: ProcessedOutcome,
) -> Result<ProcessedOutcome, MirrorError> {
    ctx.store.mark_processed(task, outcome)?;
    Ok(outcome)
}

/// Records the outcome and harvests links from an HTML body
///
/// In split mode the task is marked processed before its links are enqueued.
/// In journaled mode links go first: the task's claim covers a crash in
/// between, and the rerun rescans the stored document.
fn finish(
    ctx: &WorkerContext,
    task: &Task,
    url: &Url,
    outcome: ProcessedOutcome,
    html: Option<&[u8]>,
    state: &watch::Sender<WorkerState>,
) -> Result<(), MirrorError> {
    let links_first = ctx.settings.consistency == ConsistencyMode::Journaled;

    if !links_first {
        ctx.store.mark_processed(task, outcome)?;
    }

    if let Some(body) = html {
        transition(state, WorkerState::Extracting);
        harvest_links(ctx, url, body)?;
    }

    if links_first {
        ctx.store.mark_processed(task, outcome)?;
    }

    Ok(())
}

fn harvest_links(ctx: &WorkerContext, base: &Url, body: &[u8]) -> Result<usize, MirrorError> {
    let html = String::from_utf8_lossy(body);
    let raw_links = extract_links(&html);
    let candidates = resolve_same_site(&raw_links, base, &ctx.settings.target_domain);

    let mut added = 0;
    for url in &candidates {
        let child = Task::from_url(url);
        if ctx.store.is_processed(&child)? {
            continue;
        }
        if ctx.store.enqueue(&child)? == Enqueued::Added {
            added += 1;
        }
    }

    tracing::debug!(
        found = raw_links.len(),
        same_site = candidates.len(),
        added,
        "Harvested links"
    );
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crawler::coordinator::cancel_pair;
    use crate::storage::SqliteTaskStore;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer, dir: &TempDir, mode: ConsistencyMode) -> Arc<RuntimeSettings> {
        let mut config = Config::default();
        config.crawler.start_url = Some(format!("{}/", server.uri()));
        config.crawler.http_timeout = 2;
        config.crawler.pause_between_jobs = 10;
        config.crawler.consistency = mode;
        config.output.output_dir = Some(dir.path().to_path_buf());
        config.output.log_to_stdout = true;

        let settings = RuntimeSettings::resolve(&config).unwrap();
        settings.prepare_dirs().unwrap();
        Arc::new(settings)
    }

    /// A worker positioned as `run` leaves it right before `run_task`
    fn worker_for(settings: &Arc<RuntimeSettings>, store: Arc<SqliteTaskStore>) -> Worker {
        let ctx = WorkerContext {
            store,
            settings: Arc::clone(settings),
            fetcher: Fetcher::new(settings).unwrap(),
            in_flight: InFlight::new(),
        };
        let (_handle, signal) = cancel_pair();
        let (state, _) = watch::channel(WorkerState::Fetching);
        Worker::new(1, ctx, signal, Arc::new(state))
    }

    async fn collision_is_requeued(mode: ConsistencyMode) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("root", "text/plain"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let settings = settings_for(&server, &dir, mode);
        let seed = Task::from_url(&settings.start_url);
        let store = Arc::new(SqliteTaskStore::open(&settings.store_path, &seed, mode).unwrap());

        // Another worker is halfway through writing the same document
        let temp = settings.documents_root.join("index.txt.temp");
        std::fs::write(&temp, b"partial").unwrap();

        let mut worker = worker_for(&settings, Arc::clone(&store));
        let task = store.dequeue().unwrap().unwrap();
        worker.run_task(task.clone()).await;

        assert_eq!(worker.tasks.requeued, 1);
        assert_eq!(worker.tasks.abandoned, 0);
        assert!(!store.is_processed(&task).unwrap());
        assert_eq!(store.pending_tasks().unwrap(), vec![task.clone()]);
        assert_eq!(store.stats().unwrap().claimed, 0);

        // The other worker finishes; the retry finds its document
        std::fs::remove_file(&temp).unwrap();
        std::fs::write(settings.documents_root.join("index.txt"), b"root").unwrap();

        let retry = store.dequeue().unwrap().unwrap();
        worker.run_task(retry).await;

        assert_eq!(worker.tasks.completed, 1);
        let processed = store.processed_tasks().unwrap();
        assert_eq!(processed, vec![(task, ProcessedOutcome::AlreadyPresent)]);
    }

    #[tokio::test]
    async fn test_temp_collision_requeues_task_split() {
        collision_is_requeued(ConsistencyMode::Split).await;
    }

    #[tokio::test]
    async fn test_temp_collision_requeues_task_journaled() {
        collision_is_requeued(ConsistencyMode::Journaled).await;
    }

    #[tokio::test]
    async fn test_network_error_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("late", "text/html")
                    .set_delay(std::time::Duration::from_secs(4)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let settings = settings_for(&server, &dir, ConsistencyMode::Split);
        let seed = Task::from_url(&settings.start_url);
        let store = Arc::new(
            SqliteTaskStore::open(&settings.store_path, &seed, ConsistencyMode::Split).unwrap(),
        );

        let mut worker = worker_for(&settings, Arc::clone(&store));
        let task = store.dequeue().unwrap().unwrap();
        worker.run_task(task.clone()).await;

        assert_eq!(worker.tasks.completed, 1);
        assert_eq!(
            store.processed_tasks().unwrap(),
            vec![(task, ProcessedOutcome::NetworkError)]
        );
        assert!(store.pending_tasks().unwrap().is_empty());
        assert!(existing_document(&DocumentPath::for_url(
            &settings.documents_root,
            &settings.start_url
        ))
        .is_none());
    }
}
