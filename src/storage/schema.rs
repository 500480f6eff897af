//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the task store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Pending list and pending set in one table: seq orders the list (FIFO),
-- the UNIQUE constraint makes it a set
CREATE TABLE IF NOT EXISTS pending (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    task TEXT NOT NULL UNIQUE,
    enqueued_at TEXT NOT NULL
);

-- Tasks whose fetch attempt fully concluded
CREATE TABLE IF NOT EXISTS processed (
    task TEXT PRIMARY KEY,
    outcome TEXT NOT NULL,
    processed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_processed_outcome ON processed(outcome);

-- Tasks dequeued but not yet processed (journaled consistency mode)
CREATE TABLE IF NOT EXISTS claims (
    task TEXT PRIMARY KEY,
    claimed_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", get_schema_version())?;
    Ok(())
}

/// Gets the current schema version
///
/// This can be used for future migrations if the schema changes.
pub fn get_schema_version() -> u32 {
    1
}
