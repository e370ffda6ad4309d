//! Storage module for persisting synchronized logs
//!
//! This module handles all database operations for the synchronizer, including:
//! - SQLite database initialization and schema management
//! - Trimmed game log persistence and dedup lookups
//! - Run tracking and per-shard progress for resumption

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

/// Represents a sync run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// How a shard's page loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardOutcome {
    /// Hit a record that was already stored
    ReachedKnownRecord,

    /// Fetched every page up to the cap
    PageCap,

    /// A page came back empty (only with `stop-on-empty-page`)
    EmptyPage,

    /// A page request failed
    Failed,

    /// The loop is still running, or was cut off before it could finish
    InProgress,
}

impl ShardOutcome {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::ReachedKnownRecord => "reached_known_record",
            Self::PageCap => "page_cap",
            Self::EmptyPage => "empty_page",
            Self::Failed => "failed",
            Self::InProgress => "in_progress",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "reached_known_record" => Some(Self::ReachedKnownRecord),
            "page_cap" => Some(Self::PageCap),
            "empty_page" => Some(Self::EmptyPage),
            "failed" => Some(Self::Failed),
            "in_progress" => Some(Self::InProgress),
            _ => None,
        }
    }

    /// True when the shard needs no more pages in this run
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Failed | Self::InProgress)
    }
}

/// Progress row of one shard, rewritten after every page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardProgress {
    pub shard: u32,
    pub pages_fetched: u32,
    pub records_stored: u32,
    pub outcome: ShardOutcome,

    /// Last page fully processed by the pass this row tracks
    pub last_page: u32,

    /// Run whose pass started at page 1 and reached `last_page`
    pub origin_run: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_from_db_string() {
        assert_eq!(RunStatus::from_db_string("running"), Some(RunStatus::Running));
        assert_eq!(RunStatus::from_db_string("completed"), Some(RunStatus::Completed));
        assert_eq!(RunStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_shard_outcome_from_db_string() {
        assert_eq!(
            ShardOutcome::from_db_string("reached_known_record"),
            Some(ShardOutcome::ReachedKnownRecord)
        );
        assert_eq!(ShardOutcome::from_db_string("page_cap"), Some(ShardOutcome::PageCap));
        assert_eq!(
            ShardOutcome::from_db_string("in_progress"),
            Some(ShardOutcome::InProgress)
        );
        assert_eq!(ShardOutcome::from_db_string("done"), None);
    }

    #[test]
    fn test_unfinished_outcomes() {
        assert!(ShardOutcome::PageCap.is_finished());
        assert!(ShardOutcome::ReachedKnownRecord.is_finished());
        assert!(ShardOutcome::EmptyPage.is_finished());
        assert!(!ShardOutcome::Failed.is_finished());
        assert!(!ShardOutcome::InProgress.is_finished());
    }
}
