//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::records::TrimmedGameLog;
use crate::storage::{RunRecord, RunStatus, ShardProgress};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// `exists` and `save` are the only operations the page loop needs. Saving a
/// log whose id is already stored is a `ConstraintViolation`, never an
/// upsert; callers check `exists` first.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new sync run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    // ===== Game Logs =====

    /// Returns true if a log with this id is already stored
    fn exists(&self, bc_id: i64) -> StorageResult<bool>;

    /// Gets the run that stored a log, if it is stored
    fn stored_by(&self, bc_id: i64) -> StorageResult<Option<i64>>;

    /// Persists a trimmed log under the given run
    fn save(&mut self, log: &TrimmedGameLog, run_id: i64) -> StorageResult<()>;

    // ===== Shard Progress =====

    /// Inserts or replaces a shard's progress row within a run
    fn record_shard_progress(&mut self, run_id: i64, progress: &ShardProgress)
        -> StorageResult<()>;

    /// Gets the shards already finished in a run, ascending
    ///
    /// Failed and in-progress shards are not finished.
    fn completed_shards(&self, run_id: i64) -> StorageResult<Vec<u32>>;

    /// Gets every progress row of a run, ordered by shard
    fn shard_progress(&self, run_id: i64) -> StorageResult<Vec<ShardProgress>>;

    /// Gets, per shard, the newest row from runs before `run_id` when that
    /// row is failed or in progress
    fn unfinished_shards_before(&self, run_id: i64) -> StorageResult<Vec<ShardProgress>>;

    // ===== Statistics =====

    /// Counts all stored logs
    fn count_logs(&self) -> StorageResult<u64>;

    /// Counts distinct items with at least one stored log
    fn count_distinct_items(&self) -> StorageResult<u64>;

    /// Gets the date of the newest stored log
    fn newest_log_date(&self) -> StorageResult<Option<String>>;

    /// Counts runs by status
    fn count_runs(&self, status: RunStatus) -> StorageResult<u64>;
}
