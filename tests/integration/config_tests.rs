//! Configuration loading and the file-backed sync entry point

use bconomy_sync::config::{endpoint_url, load_config, load_config_with_hash};
use bconomy_sync::connection::ConnectionSettings;
use bconomy_sync::crawler::{run_sync, SyncOutcome};
use bconomy_sync::output::load_statistics;
use bconomy_sync::storage::{RunStatus, SqliteStorage, Storage};
use bconomy_sync::ConfigError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes a config whose socket points at a closed local port
fn write_config(dir: &TempDir, extra_crawler: &str) -> PathBuf {
    let db_path = dir.path().join("sync.db");
    let content = format!(
        r#"
[connection]
url = "ws://127.0.0.1:1/socket.io/"
client-token = "file-token"
handshake-timeout = 2000
max-reconnect-attempts = 0

[crawler]
shard-count = 2
max-page = 3
page-delay = 100
{}

[user-agent]
client-name = "IntegrationSync"
client-version = "0.1"
contact-url = "https://example.com/contact"

[output]
database-path = "{}"
"#,
        extra_crawler,
        db_path.display()
    );

    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_config_to_connection_settings() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    let (config, hash) = load_config_with_hash(&path).unwrap();
    let settings = ConnectionSettings::from_config(&config.connection).unwrap();

    assert_eq!(hash.len(), 64);
    assert_eq!(
        settings.url.as_str(),
        "ws://127.0.0.1:1/socket.io/?EIO=4&transport=websocket"
    );
    assert_eq!(settings.handshake_timeout.as_millis(), 2000);
    assert_eq!(config.crawler.fetch_event, "richLogsByIdType");
    assert!(!config.crawler.stop_on_empty_page);
    assert_eq!(
        endpoint_url(&config.connection).unwrap(),
        settings.url
    );
}

#[test]
fn test_invalid_crawler_section_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let content = std::fs::read_to_string(write_config(&dir, ""))
        .unwrap()
        .replace("page-delay = 100", "page-delay = 5");
    std::fs::write(&path, content).unwrap();

    assert!(matches!(load_config(&path), Err(ConfigError::Validation(_))));
}

#[tokio::test]
async fn test_unreachable_service_completes_run_with_failed_shards() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");
    let (config, hash) = load_config_with_hash(&path).unwrap();

    let outcome = run_sync(&config, &hash, false, std::future::pending())
        .await
        .unwrap();

    let summary = match outcome {
        SyncOutcome::Completed(summary) => summary,
        other => panic!("expected a completed run, got {:?}", other),
    };
    assert_eq!(summary.shards_crawled, 2);
    assert_eq!(summary.shards_failed, 2);
    assert_eq!(summary.records_stored, 0);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, hash);

    let stats = load_statistics(&storage).unwrap();
    assert_eq!(stats.total_logs, 0);
    assert_eq!(stats.runs_by_status.get(&RunStatus::Completed), Some(&1));
}

#[tokio::test]
async fn test_shutdown_marks_run_interrupted_and_next_start_resumes() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");
    let (config, hash) = load_config_with_hash(&path).unwrap();

    let first = run_sync(&config, &hash, false, async {}).await.unwrap();
    let run_id = match first {
        SyncOutcome::Interrupted { run_id } => run_id,
        other => panic!("expected an interrupted run, got {:?}", other),
    };

    {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
        assert_eq!(
            storage.get_run(run_id).unwrap().status,
            RunStatus::Interrupted
        );
    }

    let second = run_sync(&config, &hash, false, std::future::pending())
        .await
        .unwrap();
    match second {
        SyncOutcome::Completed(summary) => {
            assert_eq!(summary.run_id, run_id);
            assert!(summary.resumed);
        }
        other => panic!("expected a completed run, got {:?}", other),
    }

    let third = run_sync(&config, &hash, true, std::future::pending())
        .await
        .unwrap();
    match third {
        SyncOutcome::Completed(summary) => assert_ne!(summary.run_id, run_id),
        other => panic!("expected a completed run, got {:?}", other),
    }
}
