//! End-to-end sync over the in-memory transport

use crate::server::{market_log, FakeService};
use bconomy_sync::client::RequestClient;
use bconomy_sync::config::CrawlerConfig;
use bconomy_sync::connection::{
    Connection, ConnectionSettings, MemoryBehavior, MemoryListener, MemoryTransport,
    StaticSession,
};
use bconomy_sync::crawler::{Coordinator, LogFeed, ReconnectPolicy};
use bconomy_sync::storage::{RunStatus, ShardOutcome, SqliteStorage, Storage};
use bconomy_sync::{ConnectionError, ConnectionState, RequestError};
use serde_json::json;
use std::time::Duration;
use url::Url;

fn settings() -> ConnectionSettings {
    ConnectionSettings {
        url: Url::parse("ws://game.test/socket.io/?EIO=4&transport=websocket").unwrap(),
        client_token: "integration-token".to_string(),
        handshake_timeout: Duration::from_secs(10),
    }
}

fn crawler(shard_count: u32, max_page: u32) -> CrawlerConfig {
    CrawlerConfig {
        shard_count,
        max_page,
        ..CrawlerConfig::default()
    }
}

fn feed(transport: MemoryTransport) -> LogFeed {
    let connection = Connection::new(settings(), transport, StaticSession::default());
    LogFeed::new(
        RequestClient::new(connection).with_timeout(Some(Duration::from_secs(30))),
        "richLogsByIdType",
        ReconnectPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
        },
    )
}

fn serve(listener: MemoryListener) -> FakeService {
    let service = FakeService::default();
    service.clone().serve(listener);
    service
}

#[tokio::test(start_paused = true)]
async fn test_full_sync_stops_each_shard_at_known_log() {
    let (transport, listener) = MemoryTransport::new();
    let service = serve(listener);

    let mut storage = SqliteStorage::open_in_memory().unwrap();
    let seed_run = storage.create_run("seed").unwrap();
    let known = bconomy_sync::records::trim_game_log(&market_log(11, 1)).unwrap();
    storage.save(&known, seed_run).unwrap();
    storage.complete_run(seed_run).unwrap();

    // Item 0: two full pages, then nothing new
    service.set_page(0, 1, vec![market_log(3, 0), market_log(2, 0)]);
    service.set_page(0, 2, vec![market_log(1, 0)]);
    // Item 1: one new log, then the log stored earlier
    service.set_page(1, 1, vec![market_log(12, 1), market_log(11, 1), market_log(10, 1)]);
    service.set_page(1, 2, vec![market_log(9, 1)]);
    // Item 2: an unpriced row among market logs
    service.set_page(
        2,
        1,
        vec![
            json!({"gameLog": {"id": 21, "itemId": 2, "date": 0, "data": {"amount": 1}}}),
            market_log(20, 2),
        ],
    );

    let mut coordinator =
        Coordinator::new(crawler(3, 3), storage, feed(transport), "hash", false).unwrap();

    let start = tokio::time::Instant::now();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(
        service.page_requests(),
        vec![(0, 1), (0, 2), (0, 3), (1, 1), (2, 1), (2, 2), (2, 3)]
    );
    assert_eq!(summary.pages_fetched, 7);
    assert_eq!(summary.records_stored, 5);
    assert_eq!(summary.records_skipped, 1);
    assert_eq!(summary.duplicates_hit, 1);
    assert_eq!(start.elapsed(), Duration::from_millis(7 * 400));

    let storage = coordinator.storage();
    for id in [1, 2, 3, 12, 20] {
        assert!(storage.exists(id).unwrap(), "log {} should be stored", id);
    }
    assert!(!storage.exists(10).unwrap());
    assert!(!storage.exists(21).unwrap());

    let progress = storage.shard_progress(summary.run_id).unwrap();
    assert_eq!(progress[0].outcome, ShardOutcome::PageCap);
    assert_eq!(progress[1].outcome, ShardOutcome::ReachedKnownRecord);
    assert_eq!(
        storage.get_run(summary.run_id).unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_requests_use_monotonic_ids_and_item_params() {
    let (transport, listener) = MemoryTransport::new();
    let service = serve(listener);

    let mut coordinator = Coordinator::new(
        crawler(2, 2),
        SqliteStorage::open_in_memory().unwrap(),
        feed(transport),
        "hash",
        false,
    )
    .unwrap();
    coordinator.run().await.unwrap();

    let received = service.received();
    assert_eq!(
        received.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert!(received.iter().all(|r| r.event == "richLogsByIdType"));
    assert_eq!(
        received[2].params,
        json!({"idType": "itemId", "id": 1, "page": 1})
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropped_connection_fails_shard_and_next_shard_reconnects() {
    let (transport, listener) = MemoryTransport::new();
    let service = serve(listener);
    service.set_page(0, 1, vec![market_log(1, 0)]);
    service.set_page(1, 1, vec![market_log(5, 1)]);
    service.drop_connection_on(0, 2);

    let mut coordinator = Coordinator::new(
        crawler(2, 2),
        SqliteStorage::open_in_memory().unwrap(),
        feed(transport),
        "hash",
        false,
    )
    .unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.shards_failed, 1);
    assert_eq!(service.page_requests(), vec![(0, 1), (0, 2), (1, 1), (1, 2)]);
    assert!(coordinator.storage().exists(1).unwrap());
    assert!(coordinator.storage().exists(5).unwrap());

    let progress = coordinator.storage().shard_progress(summary.run_id).unwrap();
    assert_eq!(progress[0].outcome, ShardOutcome::Failed);
    assert_eq!(progress[1].outcome, ShardOutcome::PageCap);
}

#[tokio::test(start_paused = true)]
async fn test_next_run_fills_pages_after_dropped_connection() {
    let dir = tempfile::TempDir::new().unwrap();
    let database = dir.path().join("sync.db");
    let (transport, listener) = MemoryTransport::new();
    let service = serve(listener);
    for page in 1..=3u64 {
        service.set_page(0, page, vec![market_log(page as i64, 0)]);
    }
    service.drop_connection_on(0, 2);

    let mut first = Coordinator::new(
        crawler(1, 3),
        SqliteStorage::new(&database).unwrap(),
        feed(transport),
        "hash",
        false,
    )
    .unwrap();
    assert_eq!(first.run().await.unwrap().shards_failed, 1);
    drop(first);

    let (transport, listener) = MemoryTransport::new();
    service.clone().serve(listener);
    let mut second = Coordinator::new(
        crawler(1, 3),
        SqliteStorage::new(&database).unwrap(),
        feed(transport),
        "hash",
        false,
    )
    .unwrap();
    let summary = second.run().await.unwrap();

    assert_eq!(summary.records_stored, 2);
    assert_eq!(
        service.page_requests(),
        vec![(0, 1), (0, 2), (0, 1), (0, 2), (0, 3)]
    );
    assert_eq!(second.storage().count_logs().unwrap(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_service_fails_every_shard_without_stopping() {
    let (transport, _listener) = MemoryTransport::with_behavior(MemoryBehavior::Refuse);

    let mut coordinator = Coordinator::new(
        crawler(3, 5),
        SqliteStorage::open_in_memory().unwrap(),
        feed(transport),
        "hash",
        false,
    )
    .unwrap();

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.shards_crawled, 3);
    assert_eq!(summary.shards_failed, 3);
    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(coordinator.storage().count_logs().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_socket_that_never_opens_registers_nothing() {
    let (transport, _listener) = MemoryTransport::with_behavior(MemoryBehavior::Hang);
    let connection = Connection::new(settings(), transport, StaticSession::default());
    let client = RequestClient::new(connection.clone());

    let result = connection.connect().await;

    assert!(matches!(
        result,
        Err(ConnectionError::HandshakeTimeout { timeout_ms: 10_000 })
    ));
    assert_eq!(connection.state(), ConnectionState::Disconnected);

    let request = client.request("richLogsByIdType", &json!({"id": 0})).await;
    assert_eq!(request, Err(RequestError::NotConnected));
    assert_eq!(connection.pending_requests(), 0);
}

#[tokio::test]
async fn test_ping_is_answered_before_next_frame() {
    let (transport, mut listener) = MemoryTransport::new();
    let connection = Connection::new(settings(), transport, StaticSession::default());
    let client = RequestClient::new(connection.clone());

    let server = tokio::spawn(async move {
        let mut peer = listener.accept().await.unwrap();
        peer.send(r#"0{"sid":"abc"}"#);
        let handshake = peer.recv().await.unwrap();
        let request = peer.recv().await.unwrap();
        peer.send("2");
        peer.send(r#"431["ok"]"#);
        let pong = peer.recv().await.unwrap();
        (handshake, request, pong, peer)
    });

    connection.connect().await.unwrap();
    let result = client.request("ping-test", &json!({})).await.unwrap();
    let (handshake, request, pong, _peer) = server.await.unwrap();

    assert_eq!(handshake, r#"40{"token":"integration-token"}"#);
    assert_eq!(request, r#"421["ping-test",{}]"#);
    assert_eq!(pong, "3");
    assert_eq!(result, json!("ok"));
}
