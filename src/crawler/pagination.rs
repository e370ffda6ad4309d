//! Per-shard page loop
//!
//! Pages are newest-first, so the first already-stored record means the rest
//! of the shard is known and the loop stops there. Every fetch, successful or
//! not, is followed by the page delay, and every page leaves a progress row
//! behind so a pass cut off mid-shard can be continued from its cursor.

use crate::crawler::PageSource;
use crate::records::trim_game_log;
use crate::storage::{ShardOutcome, ShardProgress, Storage, StorageResult};
use std::time::Duration;

/// Limits applied to each shard's page loop
#[derive(Debug, Clone)]
pub struct PaginationSettings {
    /// Highest page number requested for a shard
    pub max_page: u32,

    /// Pause after every page fetch
    pub page_delay: Duration,

    /// End the shard as soon as a page comes back empty
    pub stop_on_empty_page: bool,
}

/// Where an unfinished pass over a shard left off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backfill {
    /// First page the pass did not process
    pub from_page: u32,

    /// Run the pass belongs to. Logs stored by it or a later run are passed
    /// over; a log stored by an older run ends the shard.
    pub origin_run: i64,
}

impl Backfill {
    pub fn after(progress: &ShardProgress) -> Self {
        Self {
            from_page: progress.last_page.saturating_add(1),
            origin_run: progress.origin_run,
        }
    }
}

/// How a shard is crawled in the current run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardPlan {
    /// Unfinished pass to continue
    pub backfill: Option<Backfill>,

    /// Counts already recorded for the shard in the current run
    pub pages_fetched: u32,
    pub records_stored: u32,
}

impl ShardPlan {
    /// Continues a shard left unfinished earlier in the same run
    pub fn resume(progress: &ShardProgress) -> Self {
        Self {
            backfill: Some(Backfill::after(progress)),
            pages_fetched: progress.pages_fetched,
            records_stored: progress.records_stored,
        }
    }

    /// Crawls a shard whose last pass in an earlier run did not finish
    pub fn carry(progress: &ShardProgress) -> Self {
        Self {
            backfill: Some(Backfill::after(progress)),
            ..Self::default()
        }
    }
}

/// What happened while crawling one shard
///
/// Counts cover this call only; the persisted row adds the plan's counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardReport {
    pub shard: u32,
    pub pages_fetched: u32,
    pub records_stored: u32,
    pub records_skipped: u32,

    /// Logs passed over because the unfinished pass had already stored them
    pub records_revisited: u32,

    pub outcome: ShardOutcome,

    /// Fetch error that ended the shard, if any
    pub error: Option<String>,

    pub last_page: u32,
    pub origin_run: i64,

    prior_pages: u32,
    prior_records: u32,
}

impl ShardReport {
    fn new(shard: u32, plan: &ShardPlan) -> Self {
        Self {
            shard,
            pages_fetched: 0,
            records_stored: 0,
            records_skipped: 0,
            records_revisited: 0,
            outcome: ShardOutcome::InProgress,
            error: None,
            last_page: 0,
            origin_run: 0,
            prior_pages: plan.pages_fetched,
            prior_records: plan.records_stored,
        }
    }

    /// The progress row persisted for this shard
    pub fn progress(&self) -> ShardProgress {
        ShardProgress {
            shard: self.shard,
            pages_fetched: self.prior_pages + self.pages_fetched,
            records_stored: self.prior_records + self.records_stored,
            outcome: self.outcome,
            last_page: self.last_page,
            origin_run: self.origin_run,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pass {
    /// From page 1; any stored log ends it. `pending` is an older unfinished
    /// pass that takes over once this one reaches stored logs.
    Head { pending: Option<Backfill> },

    /// From a cursor
    Backfill(Backfill),
}

/// Crawls one shard until a known record, the page cap, or a fetch failure
///
/// Without a backfill the shard is read from page 1. A backfill from the
/// current run is continued directly; one carried over from an earlier run
/// runs after the head pass reaches logs that are already stored.
///
/// Fetch failures end the shard and are reported in the returned
/// [`ShardReport`]. Storage failures are returned as errors.
pub async fn crawl_shard<P, S>(
    source: &P,
    storage: &mut S,
    run_id: i64,
    shard: u32,
    plan: &ShardPlan,
    settings: &PaginationSettings,
) -> StorageResult<ShardReport>
where
    P: PageSource + ?Sized,
    S: Storage + ?Sized,
{
    let mut report = ShardReport::new(shard, plan);

    match plan.backfill {
        Some(backfill) if backfill.origin_run == run_id => {
            tracing::info!("Shard {} resuming at page {}", shard, backfill.from_page);
            let pass = Pass::Backfill(backfill);
            run_pass(source, storage, run_id, settings, &mut report, pass).await?;
        }
        pending => {
            let pass = Pass::Head { pending };
            run_pass(source, storage, run_id, settings, &mut report, pass).await?;

            if let Some(backfill) = pending {
                if report.outcome == ShardOutcome::ReachedKnownRecord
                    && backfill.from_page <= settings.max_page
                {
                    tracing::info!(
                        "Shard {} continuing run {} from page {}",
                        shard,
                        backfill.origin_run,
                        backfill.from_page
                    );
                    let pass = Pass::Backfill(backfill);
                    run_pass(source, storage, run_id, settings, &mut report, pass).await?;
                }
            }
        }
    }

    Ok(report)
}

async fn run_pass<P, S>(
    source: &P,
    storage: &mut S,
    run_id: i64,
    settings: &PaginationSettings,
    report: &mut ShardReport,
    pass: Pass,
) -> StorageResult<()>
where
    P: PageSource + ?Sized,
    S: Storage + ?Sized,
{
    let shard = report.shard;
    let (mut page, origin_run) = match pass {
        Pass::Head { .. } => (1, run_id),
        Pass::Backfill(backfill) => (backfill.from_page, backfill.origin_run),
    };
    report.last_page = page.saturating_sub(1);
    report.origin_run = origin_run;
    report.outcome = ShardOutcome::InProgress;
    let mut stored_in_pass = 0;

    if page > settings.max_page {
        report.outcome = ShardOutcome::PageCap;
        storage.record_shard_progress(run_id, &report.progress())?;
        return Ok(());
    }

    loop {
        let fetched = source.fetch_page(shard, page).await;
        report.pages_fetched += 1;

        let records = match fetched {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Shard {} page {} failed: {}", shard, page, e);
                report.outcome = ShardOutcome::Failed;
                report.error = Some(e.to_string());
                storage.record_shard_progress(
                    run_id,
                    &checkpoint(report, pass, stored_in_pass, settings),
                )?;
                tokio::time::sleep(settings.page_delay).await;
                return Ok(());
            }
        };

        tracing::debug!("Shard {} page {}: {} records", shard, page, records.len());

        let mut finished = None;
        if records.is_empty() && settings.stop_on_empty_page {
            finished = Some(ShardOutcome::EmptyPage);
        }

        for raw in &records {
            let log = match trim_game_log(raw) {
                Ok(log) => log,
                Err(reason) => {
                    tracing::debug!("Skipping record on shard {} page {}: {}", shard, page, reason);
                    report.records_skipped += 1;
                    continue;
                }
            };

            let known = match pass {
                Pass::Head { .. } => storage.exists(log.bc_id)?,
                Pass::Backfill(backfill) => match storage.stored_by(log.bc_id)? {
                    Some(stored_run) if stored_run >= backfill.origin_run => {
                        report.records_revisited += 1;
                        continue;
                    }
                    stored_run => stored_run.is_some(),
                },
            };

            if known {
                tracing::debug!("Shard {} reached known log {}", shard, log.bc_id);
                finished = Some(ShardOutcome::ReachedKnownRecord);
                break;
            }

            storage.save(&log, run_id)?;
            report.records_stored += 1;
            stored_in_pass += 1;
        }

        report.last_page = page;
        if finished.is_none() && page >= settings.max_page {
            finished = Some(ShardOutcome::PageCap);
        }
        report.outcome = finished.unwrap_or(ShardOutcome::InProgress);
        storage.record_shard_progress(
            run_id,
            &checkpoint(report, pass, stored_in_pass, settings),
        )?;

        tokio::time::sleep(settings.page_delay).await;

        if finished.is_some() {
            return Ok(());
        }
        page += 1;
    }
}

/// The progress row written after a page of `pass`
///
/// While a head pass has stored nothing it leaves no gap of its own, so a
/// pending backfill keeps its cursor. Reaching stored logs hands the shard
/// over to that backfill.
fn checkpoint(
    report: &ShardReport,
    pass: Pass,
    stored_in_pass: u32,
    settings: &PaginationSettings,
) -> ShardProgress {
    let mut row = report.progress();
    if let Pass::Head {
        pending: Some(backfill),
    } = pass
    {
        let hands_over = report.outcome == ShardOutcome::ReachedKnownRecord
            && backfill.from_page <= settings.max_page;
        if hands_over || stored_in_pass == 0 {
            row.last_page = backfill.from_page.saturating_sub(1);
            row.origin_run = backfill.origin_run;
        }
        if hands_over {
            row.outcome = ShardOutcome::InProgress;
        }
    }
    row
}
