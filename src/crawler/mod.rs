//! Crawler module for paging item logs into storage
//!
//! This module contains the core sync logic, including:
//! - The per-shard page loop with its known-record stop and page cap
//! - Run creation, resumption, and per-page shard progress
//! - The socket-backed page source with reconnect backoff

mod coordinator;
mod feed;
mod pagination;

pub use coordinator::{Coordinator, CrawlSummary};
pub use feed::{LogFeed, ReconnectPolicy, MAX_RECONNECT_DELAY};
pub use pagination::{crawl_shard, Backfill, PaginationSettings, ShardPlan, ShardReport};

use crate::config::Config;
use crate::storage::SqliteStorage;
use crate::SyncError;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::path::Path;

/// Source of raw log pages, keyed by shard and 1-based page number
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches one page of raw log rows, newest first
    async fn fetch_page(&self, shard: u32, page: u32) -> crate::Result<Vec<Value>>;
}

/// How a sync ended
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(CrawlSummary),

    /// Shutdown was requested; the run resumes on the next start
    Interrupted { run_id: i64 },
}

/// Runs a complete sync against the configured service
///
/// Opens the database, resumes or starts a run, and crawls every shard until
/// done or until `shutdown` resolves. The connection is closed either way.
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `config_hash` - Hash of the configuration file, stored with the run
/// * `fresh` - Start a new run even if an unfinished one exists
/// * `shutdown` - Resolves when the sync should stop early
///
/// # Example
///
/// ```no_run
/// use bconomy_sync::config::load_config_with_hash;
/// use bconomy_sync::crawler::run_sync;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let shutdown = async {
///     let _ = tokio::signal::ctrl_c().await;
/// };
/// let outcome = run_sync(&config, &hash, false, shutdown).await?;
/// println!("{:?}", outcome);
/// # Ok(())
/// # }
/// ```
pub async fn run_sync<F>(
    config: &Config,
    config_hash: &str,
    fresh: bool,
    shutdown: F,
) -> Result<SyncOutcome, SyncError>
where
    F: Future<Output = ()>,
{
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let feed = LogFeed::from_config(config)?;
    let mut coordinator =
        Coordinator::new(config.crawler.clone(), storage, feed, config_hash, fresh)?;

    let run_id = coordinator.run_id();
    let result = tokio::select! {
        result = coordinator.run() => result.map(SyncOutcome::Completed),
        _ = shutdown => Ok(SyncOutcome::Interrupted { run_id }),
    };

    if let Ok(SyncOutcome::Interrupted { .. }) = result {
        coordinator.mark_interrupted()?;
    }

    coordinator.source().close();
    result
}
