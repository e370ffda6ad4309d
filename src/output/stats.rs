//! Statistics generation from the sync database
//!
//! This module provides functionality for extracting and displaying
//! sync statistics from the storage layer.

use crate::storage::{RunRecord, RunStatus, ShardOutcome, Storage};
use crate::SyncError;
use std::collections::HashMap;

/// Sync statistics summary
#[derive(Debug, Clone)]
pub struct SyncStatistics {
    /// Total number of stored logs
    pub total_logs: u64,

    /// Number of items with at least one stored log
    pub distinct_items: u64,

    /// Date of the newest stored log
    pub newest_log_date: Option<String>,

    /// Count of runs by status
    pub runs_by_status: HashMap<RunStatus, u64>,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,

    /// Shard outcomes of the most recent run
    pub latest_run_outcomes: HashMap<ShardOutcome, u64>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(SyncStatistics)` - Successfully loaded statistics
/// * `Err(SyncError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<SyncStatistics, SyncError> {
    let total_logs = storage.count_logs()?;
    let distinct_items = storage.count_distinct_items()?;
    let newest_log_date = storage.newest_log_date()?;

    let mut runs_by_status = HashMap::new();
    for status in [
        RunStatus::Running,
        RunStatus::Completed,
        RunStatus::Interrupted,
        RunStatus::Failed,
    ] {
        let count = storage.count_runs(status)?;
        if count > 0 {
            runs_by_status.insert(status, count);
        }
    }

    let latest_run = storage.get_latest_run()?;

    let mut latest_run_outcomes = HashMap::new();
    if let Some(run) = &latest_run {
        for progress in storage.shard_progress(run.id)? {
            *latest_run_outcomes.entry(progress.outcome).or_insert(0) += 1;
        }
    }

    Ok(SyncStatistics {
        total_logs,
        distinct_items,
        newest_log_date,
        runs_by_status,
        latest_run,
        latest_run_outcomes,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &SyncStatistics) {
    println!("=== Sync Statistics ===\n");

    println!("Overview:");
    println!("  Stored logs: {}", stats.total_logs);
    println!("  Items with logs: {}", stats.distinct_items);
    println!(
        "  Newest log: {}",
        stats.newest_log_date.as_deref().unwrap_or("(none)")
    );
    println!();

    println!("Runs:");
    let mut run_counts: Vec<_> = stats.runs_by_status.iter().collect();
    run_counts.sort_by(|a, b| b.1.cmp(a.1));
    for (status, count) in run_counts {
        println!("  {}: {}", status.to_db_string(), count);
    }
    println!();

    if let Some(run) = &stats.latest_run {
        println!("Latest Run (#{}):", run.id);
        println!("  Status: {}", run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }

        let recorded_shards: u64 = stats.latest_run_outcomes.values().sum();
        println!("  Shards recorded: {}", recorded_shards);

        let mut outcomes: Vec<_> = stats.latest_run_outcomes.iter().collect();
        outcomes.sort_by(|a, b| b.1.cmp(a.1));
        for (outcome, count) in outcomes {
            let percentage = (*count as f64 / recorded_shards as f64) * 100.0;
            println!(
                "    {}: {} ({:.1}%)",
                outcome.to_db_string(),
                count,
                percentage
            );
        }
    } else {
        println!("No runs recorded yet");
    }
}
