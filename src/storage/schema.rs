//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Bconomy-Sync database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track sync runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Trimmed game logs, keyed by the upstream log id
CREATE TABLE IF NOT EXISTS game_logs (
    bc_id INTEGER PRIMARY KEY,
    sender_bc_id INTEGER,
    recipient_bc_id INTEGER,
    item_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    amount REAL,
    price REAL NOT NULL,
    stored_at TEXT NOT NULL,
    run_id INTEGER NOT NULL REFERENCES runs(id)
);

CREATE INDEX IF NOT EXISTS idx_game_logs_item ON game_logs(item_id);
CREATE INDEX IF NOT EXISTS idx_game_logs_date ON game_logs(date);

-- Per-shard page cursor within a run
CREATE TABLE IF NOT EXISTS shard_progress (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    shard INTEGER NOT NULL,
    pages_fetched INTEGER NOT NULL,
    records_stored INTEGER NOT NULL,
    outcome TEXT NOT NULL,
    last_page INTEGER NOT NULL,
    origin_run INTEGER NOT NULL REFERENCES runs(id),
    updated_at TEXT NOT NULL,
    PRIMARY KEY (run_id, shard)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
