//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::records::TrimmedGameLog;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, ShardOutcome, ShardProgress};
use crate::SyncError;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SyncError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SyncError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database, used by dry runs and tests
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<ShardProgress> {
    Ok(ShardProgress {
        shard: row.get(0)?,
        pages_fetched: row.get(1)?,
        records_stored: row.get(2)?,
        outcome: ShardOutcome::from_db_string(&row.get::<_, String>(3)?)
            .unwrap_or(ShardOutcome::Failed),
        last_page: row.get(4)?,
        origin_run: row.get(5)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Game Logs =====

    fn exists(&self, bc_id: i64) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM game_logs WHERE bc_id = ?1",
                params![bc_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn stored_by(&self, bc_id: i64) -> StorageResult<Option<i64>> {
        let run_id = self
            .conn
            .query_row(
                "SELECT run_id FROM game_logs WHERE bc_id = ?1",
                params![bc_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(run_id)
    }

    fn save(&mut self, log: &TrimmedGameLog, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO game_logs (bc_id, sender_bc_id, recipient_bc_id, item_id, date, amount, price, stored_at, run_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    log.bc_id,
                    log.sender_bc_id,
                    log.recipient_bc_id,
                    log.item_id,
                    log.date.to_rfc3339(),
                    log.amount,
                    log.price,
                    now,
                    run_id
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StorageError::ConstraintViolation(format!("game log {}: {}", log.bc_id, e))
                } else {
                    StorageError::Sqlite(e)
                }
            })?;
        Ok(())
    }

    // ===== Shard Progress =====

    fn record_shard_progress(
        &mut self,
        run_id: i64,
        progress: &ShardProgress,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO shard_progress (run_id, shard, pages_fetched, records_stored, outcome, last_page, origin_run, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(run_id, shard) DO UPDATE SET
                pages_fetched = excluded.pages_fetched,
                records_stored = excluded.records_stored,
                outcome = excluded.outcome,
                last_page = excluded.last_page,
                origin_run = excluded.origin_run,
                updated_at = excluded.updated_at",
            params![
                run_id,
                progress.shard,
                progress.pages_fetched,
                progress.records_stored,
                progress.outcome.to_db_string(),
                progress.last_page,
                progress.origin_run,
                now
            ],
        )?;
        Ok(())
    }

    fn completed_shards(&self, run_id: i64) -> StorageResult<Vec<u32>> {
        let mut stmt = self.conn.prepare(
            "SELECT shard FROM shard_progress
             WHERE run_id = ?1 AND outcome NOT IN (?2, ?3)
             ORDER BY shard",
        )?;

        let shards = stmt
            .query_map(
                params![
                    run_id,
                    ShardOutcome::Failed.to_db_string(),
                    ShardOutcome::InProgress.to_db_string()
                ],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<u32>, _>>()?;

        Ok(shards)
    }

    fn shard_progress(&self, run_id: i64) -> StorageResult<Vec<ShardProgress>> {
        let mut stmt = self.conn.prepare(
            "SELECT shard, pages_fetched, records_stored, outcome, last_page, origin_run
             FROM shard_progress WHERE run_id = ?1 ORDER BY shard",
        )?;

        let rows = stmt
            .query_map(params![run_id], progress_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn unfinished_shards_before(&self, run_id: i64) -> StorageResult<Vec<ShardProgress>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.shard, p.pages_fetched, p.records_stored, p.outcome, p.last_page, p.origin_run
             FROM shard_progress p
             WHERE p.run_id = (
                 SELECT MAX(q.run_id) FROM shard_progress q
                 WHERE q.shard = p.shard AND q.run_id < ?1
             )
             AND p.outcome IN (?2, ?3)
             ORDER BY p.shard",
        )?;

        let rows = stmt
            .query_map(
                params![
                    run_id,
                    ShardOutcome::Failed.to_db_string(),
                    ShardOutcome::InProgress.to_db_string()
                ],
                progress_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    // ===== Statistics =====

    fn count_logs(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM game_logs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_distinct_items(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT item_id) FROM game_logs",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn newest_log_date(&self) -> StorageResult<Option<String>> {
        let date: Option<String> =
            self.conn
                .query_row("SELECT MAX(date) FROM game_logs", [], |row| row.get(0))?;
        Ok(date)
    }

    fn count_runs(&self, status: RunStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
