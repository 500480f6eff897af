//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the TaskStore trait.
//! One connection is shared behind a mutex and every public operation runs
//! as a single `IMMEDIATE` transaction, which makes each operation atomic
//! both against other workers and against a crash.

use crate::config::ConsistencyMode;
use crate::state::ProcessedOutcome;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Enqueued, StorageError, StorageResult, TaskStore};
use crate::storage::{QueueStats, RunRecord, RunStatus, Task};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite task store backend
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
    mode: ConsistencyMode,
}

impl SqliteTaskStore {
    /// Opens the store at `path`, creating it if needed
    ///
    /// Leftover claims from an unclean shutdown are moved back to the pending
    /// tail, runs still marked `running` are marked `interrupted`, and the
    /// pending list is seeded with `seed` if it is empty. The size of the
    /// pending list, not the existence of the file, decides between a fresh
    /// crawl and a resume.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `seed` - Task to start from when there is no pending work
    /// * `mode` - How dequeued-but-unfinished tasks are tracked
    pub fn open(path: &Path, seed: &Task, mode: ConsistencyMode) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Self::from_connection(conn, seed, mode)
    }

    /// Opens an existing store for inspection without seeding it
    ///
    /// Safe to call while a crawl holds the store: the schema is only written
    /// when it is missing, and reads wait out a writer's lock.
    pub fn open_for_stats(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let has_schema: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'pending')",
            [],
            |row| row.get(0),
        )?;
        if !has_schema {
            initialize_schema(&conn)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
            mode: ConsistencyMode::default(),
        })
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub fn open_in_memory(seed: &Task, mode: ConsistencyMode) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, seed, mode)
    }

    fn from_connection(conn: Connection, seed: &Task, mode: ConsistencyMode) -> StorageResult<Self> {
        initialize_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            mode,
        };
        store.recover()?;
        store.seed_if_empty(seed)?;

        Ok(store)
    }

    /// The consistency mode this store was opened with
    pub fn mode(&self) -> ConsistencyMode {
        self.mode
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Repairs state left behind by a process that did not shut down cleanly
    fn recover(&self) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stale_runs = tx.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE status = ?3",
            params![
                RunStatus::Interrupted.to_db_string(),
                now,
                RunStatus::Running.to_db_string()
            ],
        )?;
        if stale_runs > 0 {
            tracing::warn!(
                stale_runs,
                "previous run did not finish cleanly, resuming from persisted queue"
            );
        }

        let requeued = tx.execute(
            "INSERT OR IGNORE INTO pending (task, enqueued_at)
             SELECT task, ?1 FROM claims
             WHERE task NOT IN (SELECT task FROM processed)
             ORDER BY claimed_at, rowid",
            params![now],
        )?;
        tx.execute("DELETE FROM claims", [])?;
        if requeued > 0 {
            tracing::info!(requeued, "requeued tasks claimed by an interrupted run");
        }

        tx.commit()?;
        Ok(())
    }

    fn seed_if_empty(&self, seed: &Task) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let pending: i64 = tx.query_row("SELECT COUNT(*) FROM pending", [], |row| row.get(0))?;
        if pending > 0 {
            tracing::info!(pending, "resuming crawl from persisted queue");
        } else {
            match enqueue_in_tx(&tx, seed)? {
                Enqueued::Added => tracing::info!(seed = %seed, "seeded empty queue"),
                Enqueued::AlreadyQueued => {
                    tracing::info!(seed = %seed, "seed already processed, nothing left to crawl")
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Records the start of a crawl run and returns its id
    pub fn begin_run(&self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Records how a crawl run ended
    pub fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    /// Gets the most recent run
    pub fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        let run = stmt
            .query_row([], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    config_hash: row.get(3)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(RunStatus::Failed),
                })
            })
            .optional()?;

        Ok(run)
    }

    /// Counts all recorded runs
    pub fn count_runs(&self) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Lists the pending list in dequeue order
    pub fn pending_tasks(&self) -> StorageResult<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT task FROM pending ORDER BY seq ASC")?;
        let tasks = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|row| row.map(Task::from_stored))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Lists the processed set with outcomes, ordered by task
    pub fn processed_tasks(&self) -> StorageResult<Vec<(Task, ProcessedOutcome)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT task, outcome FROM processed ORDER BY task ASC")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(task, outcome)| {
                ProcessedOutcome::from_db_string(&outcome)
                    .map(|outcome| (Task::from_stored(task), outcome))
            })
            .collect())
    }

    /// Releases the underlying connection
    ///
    /// Must be called once, after every worker has stopped.
    pub fn close(self) -> StorageResult<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| StorageError::LockPoisoned)?;
        conn.close().map_err(|(_, e)| StorageError::Sqlite(e))
    }
}

/// Membership checks plus insert, inside the caller's transaction
fn enqueue_in_tx(tx: &Transaction<'_>, task: &Task) -> StorageResult<Enqueued> {
    let known: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM processed WHERE task = ?1)
             OR EXISTS(SELECT 1 FROM claims WHERE task = ?1)",
        params![task.as_str()],
        |row| row.get(0),
    )?;
    if known {
        return Ok(Enqueued::AlreadyQueued);
    }

    let inserted = tx.execute(
        "INSERT OR IGNORE INTO pending (task, enqueued_at) VALUES (?1, ?2)",
        params![task.as_str(), Utc::now().to_rfc3339()],
    )?;

    Ok(if inserted == 0 {
        Enqueued::AlreadyQueued
    } else {
        Enqueued::Added
    })
}

impl TaskStore for SqliteTaskStore {
    fn enqueue(&self, task: &Task) -> StorageResult<Enqueued> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = enqueue_in_tx(&tx, task)?;
        tx.commit()?;

        tracing::trace!(task = %task, ?result, "enqueue");
        Ok(result)
    }

    fn dequeue(&self) -> StorageResult<Option<Task>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let head: Option<(i64, String)> = tx
            .query_row(
                "SELECT seq, task FROM pending ORDER BY seq ASC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((seq, task)) = head else {
            return Ok(None);
        };

        tx.execute("DELETE FROM pending WHERE seq = ?1", params![seq])?;
        if self.mode == ConsistencyMode::Journaled {
            tx.execute(
                "INSERT OR REPLACE INTO claims (task, claimed_at) VALUES (?1, ?2)",
                params![task, Utc::now().to_rfc3339()],
            )?;
        }
        tx.commit()?;

        tracing::trace!(task = %task, "dequeue");
        Ok(Some(Task::from_stored(task)))
    }

    fn requeue(&self, task: &Task) -> StorageResult<Enqueued> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute("DELETE FROM claims WHERE task = ?1", params![task.as_str()])?;
        let result = enqueue_in_tx(&tx, task)?;
        tx.commit()?;

        tracing::trace!(task = %task, ?result, "requeue");
        Ok(result)
    }

    fn mark_processed(&self, task: &Task, outcome: ProcessedOutcome) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT OR IGNORE INTO processed (task, outcome, processed_at) VALUES (?1, ?2, ?3)",
            params![task.as_str(), outcome.to_db_string(), Utc::now().to_rfc3339()],
        )?;
        // Keeps a task out of pending once processed, even if it was
        // rediscovered while in flight
        tx.execute("DELETE FROM pending WHERE task = ?1", params![task.as_str()])?;
        tx.execute("DELETE FROM claims WHERE task = ?1", params![task.as_str()])?;
        tx.commit()?;

        Ok(())
    }

    fn is_processed(&self, task: &Task) -> StorageResult<bool> {
        let conn = self.lock()?;
        let processed: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM processed WHERE task = ?1)",
            params![task.as_str()],
            |row| row.get(0),
        )?;
        Ok(processed)
    }

    fn stats(&self) -> StorageResult<QueueStats> {
        let conn = self.lock()?;

        let count = |sql: &str| -> Result<u64, rusqlite::Error> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
        };
        let pending = count("SELECT COUNT(*) FROM pending")?;
        let claimed = count("SELECT COUNT(*) FROM claims")?;
        let processed = count("SELECT COUNT(*) FROM processed")?;

        let mut stmt = conn.prepare("SELECT outcome, COUNT(*) FROM processed GROUP BY outcome")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut by_outcome = HashMap::new();
        for row in rows {
            let (outcome, n) = row?;
            if let Some(outcome) = ProcessedOutcome::from_db_string(&outcome) {
                by_outcome.insert(outcome, n as u64);
            }
        }

        Ok(QueueStats {
            pending,
            claimed,
            processed,
            by_outcome,
        })
    }
}
