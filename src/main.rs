//! Bconomy-Sync main entry point
//!
//! This is the command-line interface for the Bconomy-Sync log synchronizer.

use anyhow::{Context, Result};
use bconomy_sync::config::{endpoint_url, load_config_with_hash, Config};
use bconomy_sync::crawler::{run_sync, SyncOutcome};
use bconomy_sync::output::{load_statistics, print_statistics};
use bconomy_sync::storage::SqliteStorage;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Bconomy-Sync: a real-time game economy log synchronizer
///
/// Bconomy-Sync holds one socket connection to the game service and pages
/// through every item's trade logs, storing new ones in SQLite and stopping
/// each item at the first log it already has.
#[derive(Parser, Debug)]
#[command(name = "bconomy-sync")]
#[command(version = "1.0.0")]
#[command(about = "A real-time game economy log synchronizer", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted sync (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh sync run, ignoring unfinished ones
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be synced without connecting
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_sync(&config, &config_hash, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("bconomy_sync=info,warn"),
            1 => EnvFilter::new("bconomy_sync=debug,info"),
            2 => EnvFilter::new("bconomy_sync=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be synced
fn handle_dry_run(config: &Config) -> Result<()> {
    let endpoint = endpoint_url(&config.connection)?;

    println!("=== Bconomy-Sync Dry Run ===\n");

    println!("Connection:");
    println!("  Endpoint: {}", endpoint);
    println!(
        "  Client token: {}",
        if config.connection.client_token.is_some() {
            "set"
        } else {
            "missing"
        }
    );
    println!(
        "  Session prefetch: {}",
        config.connection.session_url.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Handshake timeout: {}ms",
        config.connection.handshake_timeout
    );
    println!("  Request timeout: {}ms", config.connection.request_timeout);
    println!(
        "  Reconnect: up to {} attempts from {}ms",
        config.connection.max_reconnect_attempts, config.connection.reconnect_base_delay
    );

    println!("\nCrawler:");
    println!("  Shards: 0..{}", config.crawler.shard_count);
    println!("  Max page: {}", config.crawler.max_page);
    println!("  Page delay: {}ms", config.crawler.page_delay);
    println!("  Fetch event: {}", config.crawler.fetch_event);
    println!("  Stop on empty page: {}", config.crawler.stop_on_empty_page);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let max_requests = u64::from(config.crawler.shard_count) * u64::from(config.crawler.max_page);
    let worst_case = Duration::from_millis(max_requests * config.crawler.page_delay);
    let best_case =
        Duration::from_millis(u64::from(config.crawler.shard_count) * config.crawler.page_delay);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would request between {} and {} pages ({:?} to {:?} of delay alone)",
        config.crawler.shard_count, max_requests, best_case, worst_case
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("Failed to open database")?;

    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main sync operation
async fn handle_sync(config: &Config, config_hash: &str, fresh: bool) -> Result<()> {
    if fresh {
        tracing::info!("Starting fresh sync (ignoring unfinished runs)");
    } else {
        tracing::info!("Starting sync (will resume an unfinished run)");
    }

    tracing::info!(
        "Shards: {}, max page: {}, page delay: {}ms",
        config.crawler.shard_count,
        config.crawler.max_page,
        config.crawler.page_delay
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Ctrl-C received, stopping");
    };

    match run_sync(config, config_hash, fresh, shutdown).await {
        Ok(SyncOutcome::Completed(summary)) => {
            tracing::info!(
                "Sync completed: {} new logs across {} shards",
                summary.records_stored,
                summary.shards_crawled
            );
            Ok(())
        }
        Ok(SyncOutcome::Interrupted { run_id }) => {
            tracing::info!("Run {} interrupted; rerun to resume", run_id);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Sync failed: {}", e);
            Err(e.into())
        }
    }
}
