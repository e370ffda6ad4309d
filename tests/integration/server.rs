//! A scripted game service behind the in-memory transport

use bconomy_sync::connection::{MemoryListener, MemoryPeer};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One request the service received
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    pub id: u64,
    pub event: String,
    pub params: Value,
}

/// Log pages served by item id and page number, plus the request log
#[derive(Clone, Default)]
pub struct FakeService {
    pages: Arc<Mutex<HashMap<(u64, u64), Vec<Value>>>>,
    received: Arc<Mutex<Vec<Received>>>,
    drop_on: Arc<Mutex<Vec<(u64, u64)>>>,
}

impl FakeService {
    pub fn set_page(&self, item: u64, page: u64, logs: Vec<Value>) {
        self.pages.lock().insert((item, page), logs);
    }

    /// Close the socket instead of answering this page, once
    pub fn drop_connection_on(&self, item: u64, page: u64) {
        self.drop_on.lock().push((item, page));
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().clone()
    }

    /// (item, page) of every page request, in order
    pub fn page_requests(&self) -> Vec<(u64, u64)> {
        self.received()
            .iter()
            .map(|r| {
                (
                    r.params["id"].as_u64().unwrap(),
                    r.params["page"].as_u64().unwrap(),
                )
            })
            .collect()
    }

    /// Accepts every link opened through the transport until the listener
    /// closes; each link gets its own session id
    pub fn serve(self, mut listener: MemoryListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut sessions = 0;
            while let Some(peer) = listener.accept().await {
                sessions += 1;
                let service = self.clone();
                tokio::spawn(service.handle(peer, format!("session-{}", sessions)));
            }
        })
    }

    async fn handle(self, mut peer: MemoryPeer, sid: String) {
        peer.send(format!(r#"0{{"sid":"{}","pingInterval":25000}}"#, sid));

        while let Some(raw) = peer.recv().await {
            let Some(rest) = raw.strip_prefix("42") else {
                continue;
            };
            let split = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let id: u64 = rest[..split].parse().unwrap();
            let body: Value = serde_json::from_str(&rest[split..]).unwrap();
            let received = Received {
                id,
                event: body[0].as_str().unwrap().to_string(),
                params: body[1].clone(),
            };
            self.received.lock().push(received.clone());

            let key = (
                received.params["id"].as_u64().unwrap(),
                received.params["page"].as_u64().unwrap(),
            );

            let should_drop = {
                let mut drop_on = self.drop_on.lock();
                match drop_on.iter().position(|k| *k == key) {
                    Some(index) => {
                        drop_on.remove(index);
                        true
                    }
                    None => false,
                }
            };
            if should_drop {
                peer.close(Some("server restart"));
                return;
            }

            let logs = self.pages.lock().get(&key).cloned().unwrap_or_default();
            peer.send("2");
            peer.send(format!("43{}{}", id, json!([logs])));
        }
    }
}

/// A priced market log for `item`
pub fn market_log(id: i64, item: i64) -> Value {
    json!({
        "gameLog": {
            "id": id,
            "senderBcId": 100,
            "receiverBcId": 200,
            "itemId": item,
            "date": 1_700_000_000_000i64 + id,
            "data": { "amount": 1, "listingPrice": 42.5 }
        }
    })
}
