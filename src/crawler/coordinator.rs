//! Crawl coordinator - run bookkeeping around the shard loop
//!
//! This module contains the main crawl loop, including:
//! - Creating a run or resuming an unfinished one
//! - Crawling shards in order, one at a time
//! - Skipping finished shards and continuing unfinished ones from their cursor
//! - Summarizing the run

use crate::config::CrawlerConfig;
use crate::crawler::pagination::{crawl_shard, PaginationSettings, ShardPlan, ShardReport};
use crate::crawler::PageSource;
use crate::storage::{RunStatus, ShardOutcome, ShardProgress, Storage};
use crate::SyncError;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Totals for one crawl
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlSummary {
    pub run_id: i64,
    pub resumed: bool,
    pub shards_crawled: u32,
    pub shards_skipped: u32,
    pub shards_failed: u32,

    /// Shards that continued an unfinished pass
    pub shards_continued: u32,

    pub pages_fetched: u64,
    pub records_stored: u64,
    pub records_skipped: u64,

    /// Shards that stopped on an already-stored log
    pub duplicates_hit: u32,

    pub elapsed: Duration,
}

impl CrawlSummary {
    fn absorb(&mut self, report: &ShardReport) {
        self.shards_crawled += 1;
        self.pages_fetched += u64::from(report.pages_fetched);
        self.records_stored += u64::from(report.records_stored);
        self.records_skipped += u64::from(report.records_skipped);
        match report.outcome {
            ShardOutcome::Failed => self.shards_failed += 1,
            ShardOutcome::ReachedKnownRecord => self.duplicates_hit += 1,
            ShardOutcome::PageCap | ShardOutcome::EmptyPage | ShardOutcome::InProgress => {}
        }
    }
}

/// Main crawl coordinator structure
pub struct Coordinator<S, P> {
    settings: CrawlerConfig,
    storage: S,
    source: P,
    run_id: i64,
    resumed: bool,
}

impl<S, P> Coordinator<S, P>
where
    S: Storage,
    P: PageSource,
{
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `settings` - Shard and page limits
    /// * `storage` - Where runs, progress, and logs are kept
    /// * `source` - Where pages come from
    /// * `config_hash` - Hash of the configuration file, stored with a new run
    /// * `fresh` - Always start a new run instead of resuming
    pub fn new(
        settings: CrawlerConfig,
        mut storage: S,
        source: P,
        config_hash: &str,
        fresh: bool,
    ) -> Result<Self, SyncError> {
        let resumable = if fresh {
            None
        } else {
            storage
                .get_latest_run()?
                .filter(|run| matches!(run.status, RunStatus::Running | RunStatus::Interrupted))
        };

        let (run_id, resumed) = match resumable {
            Some(run) => {
                tracing::info!("Resuming unfinished run {} from {}", run.id, run.started_at);
                if run.config_hash != config_hash {
                    tracing::warn!("Configuration changed since run {} started", run.id);
                }
                storage.update_run_status(run.id, RunStatus::Running)?;
                (run.id, true)
            }
            None => {
                let run_id = storage.create_run(config_hash)?;
                tracing::info!("Starting new run {}", run_id);
                (run_id, false)
            }
        };

        Ok(Self {
            settings,
            storage,
            source,
            run_id,
            resumed,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    fn pagination(&self) -> PaginationSettings {
        PaginationSettings {
            max_page: self.settings.max_page,
            page_delay: Duration::from_millis(self.settings.page_delay),
            stop_on_empty_page: self.settings.stop_on_empty_page,
        }
    }

    /// Crawls every shard not yet finished in this run
    ///
    /// A shard whose fetch fails is recorded and the crawl moves on; resuming
    /// the run, or the next run, continues it from the failed page. A storage
    /// failure marks the run failed and ends the crawl.
    pub async fn run(&mut self) -> Result<CrawlSummary, SyncError> {
        match self.crawl_all().await {
            Ok(summary) => {
                self.storage.complete_run(self.run_id)?;
                tracing::info!(
                    "Run {} completed: {} shards ({} skipped, {} continued, {} failed), {} pages, {} logs stored, {} skipped in {:?}",
                    summary.run_id,
                    summary.shards_crawled,
                    summary.shards_skipped,
                    summary.shards_continued,
                    summary.shards_failed,
                    summary.pages_fetched,
                    summary.records_stored,
                    summary.records_skipped,
                    summary.elapsed
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!("Run {} failed: {}", self.run_id, e);
                if let Err(status_error) =
                    self.storage.update_run_status(self.run_id, RunStatus::Failed)
                {
                    tracing::error!("Could not mark run {} failed: {}", self.run_id, status_error);
                }
                Err(e)
            }
        }
    }

    async fn crawl_all(&mut self) -> Result<CrawlSummary, SyncError> {
        let start_time = Instant::now();
        let pagination = self.pagination();
        let progress: HashMap<u32, ShardProgress> = self
            .storage
            .shard_progress(self.run_id)?
            .into_iter()
            .map(|row| (row.shard, row))
            .collect();
        // A pass that never got past page 0 left no gap behind
        let carried: HashMap<u32, ShardProgress> = self
            .storage
            .unfinished_shards_before(self.run_id)?
            .into_iter()
            .filter(|row| row.last_page > 0)
            .map(|row| (row.shard, row))
            .collect();

        let mut summary = CrawlSummary {
            run_id: self.run_id,
            resumed: self.resumed,
            ..CrawlSummary::default()
        };

        for shard in 0..self.settings.shard_count {
            let plan = match progress.get(&shard) {
                Some(row) if row.outcome.is_finished() => {
                    tracing::debug!("Shard {} already finished in run {}", shard, self.run_id);
                    summary.shards_skipped += 1;
                    continue;
                }
                Some(row) => ShardPlan::resume(row),
                None => carried.get(&shard).map(ShardPlan::carry).unwrap_or_default(),
            };
            if plan.backfill.is_some() {
                summary.shards_continued += 1;
            }

            let report = crawl_shard(
                &self.source,
                &mut self.storage,
                self.run_id,
                shard,
                &plan,
                &pagination,
            )
            .await?;

            summary.absorb(&report);

            tracing::info!(
                "Shard {}/{}: {} pages, {} logs stored ({:?})",
                shard + 1,
                self.settings.shard_count,
                report.pages_fetched,
                report.records_stored,
                report.outcome
            );
        }

        summary.elapsed = start_time.elapsed();
        Ok(summary)
    }

    /// Marks the run interrupted so the next start resumes it
    pub fn mark_interrupted(&mut self) -> Result<(), SyncError> {
        self.storage
            .update_run_status(self.run_id, RunStatus::Interrupted)?;
        tracing::info!("Run {} interrupted; it will resume on the next start", self.run_id);
        Ok(())
    }
}
