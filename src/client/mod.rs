//! Request client
//!
//! Issues logical requests over the shared connection. Each request gets a
//! fresh correlation id, is registered before it is written, and is rolled
//! back if the write fails so no entry outlives its caller.

use crate::connection::Connection;
use crate::protocol;
use crate::{RequestError, RequestResult};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Issues correlated requests over a [`Connection`]
pub struct RequestClient {
    connection: Connection,

    /// Next correlation id; starts at 1 because id 0 is the parse fallback
    next_id: AtomicU64,

    /// Optional per-request timeout
    timeout: Option<Duration>,
}

impl RequestClient {
    /// Creates a client without a request timeout
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            next_id: AtomicU64::new(1),
            timeout: None,
        }
    }

    /// Sets the per-request timeout (`None` waits until the connection drains)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The connection requests are sent over
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends `kind` with `params` and waits for the acknowledged result
    ///
    /// # Errors
    ///
    /// * `NotConnected` - the connection is not open; nothing stays registered
    /// * `ConnectionClosed` - the connection dropped while waiting
    /// * `Timeout` - no response within the configured timeout
    /// * `MalformedResponse` - the acknowledgement was not a JSON array
    pub async fn request<P: Serialize>(&self, kind: &str, params: &P) -> RequestResult<Value> {
        let id = self.allocate_id();
        let raw = protocol::encode_request(id, kind, params)
            .map_err(|e| RequestError::Encode(e.to_string()))?;

        let table = self.connection.correlation_table();
        let handle = table.register(id)?;

        if let Err(e) = self.connection.send(raw) {
            table.remove(id);
            return Err(e);
        }
        tracing::debug!(id, kind, "Request sent");

        match self.timeout {
            None => handle.wait().await,
            Some(timeout) => match tokio::time::timeout(timeout, handle.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    table.remove(id);
                    Err(RequestError::Timeout {
                        id,
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            },
        }
    }
}
