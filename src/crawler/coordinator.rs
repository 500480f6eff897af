//! Worker pool coordinator
//!
//! This module owns the fixed set of crawl workers, including:
//! - Spawning W workers against one shared task store and HTTP client
//! - Propagating cancellation
//! - Observing worker states and the in-flight count while the pool runs
//! - Collecting per-worker exit reasons once the pool stops
//!
//! Global termination is decided by the workers themselves through the
//! shared in-flight counter; the coordinator only waits for them.

use crate::config::RuntimeSettings;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::worker::{TaskCounts, Worker, WorkerContext, WorkerExit, WorkerReport};
use crate::state::{InFlight, WorkerState};
use crate::storage::TaskStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Requests cancellation of a worker pool
///
/// Cloneable; any clone may cancel. Workers finish the task they hold, then
/// exit at their next check.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes cancellation; each worker holds its own clone
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested
    ///
    /// Never resolves if every [`CancelHandle`] is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Creates a linked cancellation handle and signal
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

/// Read-only view of a running pool
///
/// Cloneable so a progress reporter can hold one while the pool is joined.
#[derive(Debug, Clone)]
pub struct PoolMonitor {
    states: Vec<watch::Receiver<WorkerState>>,
    in_flight: InFlight,
}

impl PoolMonitor {
    pub(crate) fn from_parts(states: Vec<watch::Receiver<WorkerState>>, in_flight: InFlight) -> Self {
        Self { states, in_flight }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Current state of every worker, in id order
    pub fn states(&self) -> Vec<WorkerState> {
        self.states.iter().map(|rx| *rx.borrow()).collect()
    }

    /// Workers currently holding a task
    pub fn busy(&self) -> usize {
        self.states.iter().filter(|rx| rx.borrow().is_busy()).count()
    }

    /// Tasks currently being worked on across the pool
    pub fn in_flight(&self) -> usize {
        self.in_flight.current()
    }
}

/// A running set of workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerReport>>,
    monitor: PoolMonitor,
}

impl WorkerPool {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn monitor(&self) -> PoolMonitor {
        self.monitor.clone()
    }

    /// Waits for every worker to stop
    pub async fn join(self) -> PoolReport {
        let mut workers = Vec::with_capacity(self.handles.len());

        for (index, handle) in self.handles.into_iter().enumerate() {
            let id = index + 1;
            match handle.await {
                Ok(report) => workers.push(report),
                Err(e) => {
                    tracing::error!("Worker {} stopped abnormally: {}", id, e);
                    workers.push(WorkerReport {
                        id,
                        exit: WorkerExit::Panicked,
                        tasks: TaskCounts::default(),
                    });
                }
            }
        }

        PoolReport { workers }
    }
}

/// Summary of a finished pool
#[derive(Debug, Clone)]
pub struct PoolReport {
    pub workers: Vec<WorkerReport>,
}

impl PoolReport {
    /// True if every worker stopped because the crawl ran out of work
    pub fn drained(&self) -> bool {
        !self.workers.is_empty()
            && self
                .workers
                .iter()
                .all(|w| w.exit == WorkerExit::Drained)
    }

    /// True if any worker stopped because of cancellation
    pub fn cancelled(&self) -> bool {
        self.workers.iter().any(|w| w.exit == WorkerExit::Cancelled)
    }

    pub fn tasks_completed(&self) -> u64 {
        self.workers.iter().map(|w| w.tasks.completed).sum()
    }

    pub fn tasks_abandoned(&self) -> u64 {
        self.workers.iter().map(|w| w.tasks.abandoned).sum()
    }

    pub fn tasks_requeued(&self) -> u64 {
        self.workers.iter().map(|w| w.tasks.requeued).sum()
    }
}

/// Spawns `settings.workers` workers onto the current tokio runtime
///
/// Every worker shares `store`, `settings` and `fetcher`. Worker ids start at
/// 1, and each worker runs inside a `worker` tracing span carrying its id.
pub fn spawn_workers(
    cancel: CancelSignal,
    store: Arc<dyn TaskStore>,
    settings: Arc<RuntimeSettings>,
    fetcher: Fetcher,
) -> WorkerPool {
    let in_flight = InFlight::new();
    let ctx = WorkerContext {
        store,
        settings: Arc::clone(&settings),
        fetcher,
        in_flight: in_flight.clone(),
    };

    let mut handles = Vec::with_capacity(settings.workers);
    let mut states = Vec::with_capacity(settings.workers);

    for id in 1..=settings.workers {
        let (state_tx, state_rx) = watch::channel(WorkerState::Idle);
        let worker = Worker::new(id, ctx.clone(), cancel.clone(), Arc::new(state_tx));
        let span = tracing::info_span!("worker", id);

        handles.push(tokio::spawn(worker.run().instrument(span)));
        states.push(state_rx);
    }

    tracing::info!("Spawned {} worker(s)", handles.len());

    WorkerPool {
        handles,
        monitor: PoolMonitor::from_parts(states, in_flight),
    }
}
