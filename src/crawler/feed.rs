//! Log pages fetched over the socket connection

use crate::client::RequestClient;
use crate::config::{Config, ConnectionConfig};
use crate::connection::Connection;
use crate::crawler::PageSource;
use crate::{ConnectionError, SyncError};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Upper bound for a single reconnect backoff
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// How the feed re-establishes a dropped connection
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Extra connect attempts after the first one fails (0 disables)
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on every further retry
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            base_delay: Duration::from_millis(config.reconnect_base_delay),
        }
    }

    /// Backoff before retry number `attempt` (0-based), capped at
    /// [`MAX_RECONNECT_DELAY`]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(MAX_RECONNECT_DELAY, |delay| delay.min(MAX_RECONNECT_DELAY))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageParams<'a> {
    id_type: &'a str,
    id: u32,
    page: u32,
}

/// [`PageSource`] backed by the request client
///
/// Makes sure the connection is open before every fetch, reconnecting with
/// exponential backoff when it has dropped.
pub struct LogFeed {
    client: RequestClient,
    event: String,
    reconnect: ReconnectPolicy,
}

impl LogFeed {
    pub fn new(client: RequestClient, event: impl Into<String>, reconnect: ReconnectPolicy) -> Self {
        Self {
            client,
            event: event.into(),
            reconnect,
        }
    }

    /// Builds the production feed: WebSocket connection, configured request
    /// timeout and reconnect policy
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let connection = Connection::from_config(config)?;
        let timeout = match config.connection.request_timeout {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let client = RequestClient::new(connection).with_timeout(timeout);

        Ok(Self::new(
            client,
            config.crawler.fetch_event.clone(),
            ReconnectPolicy::from_config(&config.connection),
        ))
    }

    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    /// Connects if the connection is not open, retrying per the policy
    pub async fn ensure_open(&self) -> Result<(), ConnectionError> {
        let connection = self.client.connection();
        if connection.is_open() {
            return Ok(());
        }

        let mut attempt = 0;
        loop {
            match connection.connect().await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < self.reconnect.max_attempts => {
                    let delay = self.reconnect.delay_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "Connect failed ({}), retry {}/{} in {:?}",
                        e,
                        attempt,
                        self.reconnect.max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Closes the underlying connection
    pub fn close(&self) {
        self.client.connection().close();
    }
}

#[async_trait]
impl PageSource for LogFeed {
    async fn fetch_page(&self, shard: u32, page: u32) -> crate::Result<Vec<Value>> {
        self.ensure_open().await?;

        let params = PageParams {
            id_type: "itemId",
            id: shard,
            page,
        };

        match self.client.request(&self.event, &params).await? {
            Value::Array(records) => Ok(records),
            other => Err(SyncError::UnexpectedPayload(format!(
                "expected a list of logs for item {} page {}, got {}",
                shard,
                page,
                kind_of(&other)
            ))),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
