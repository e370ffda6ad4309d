//! Connection manager for the game service socket
//!
//! Owns the single socket link, completes the handshake, answers pings, and
//! routes responses into the correlation table.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──connect──> Connecting ──link open──> Handshaking
//!       ^                                                 │
//!       │                                       session id observed
//!       │                                                 v
//!       └──────────── close / link error ─────────────  Open
//! ```
//!
//! Every failure path ends in `Disconnected` with all pending requests
//! rejected. The manager never reconnects on its own; callers decide whether
//! to call [`Connection::connect`] again.
//!
//! Each successful `connect` starts a new link generation. Events still in
//! flight from an older link carry the old generation and are ignored.

mod memory;
mod session;
mod transport;

pub use memory::{MemoryBehavior, MemoryListener, MemoryPeer, MemoryTransport};
pub use session::{build_http_client, fold_cookies, HttpSessionPrefetch, SessionSupplier, StaticSession};
pub use transport::{Transport, TransportEvent, TransportLink, WebSocketTransport};

use crate::config::{endpoint_url, Config, ConnectionConfig};
use crate::correlation::CorrelationTable;
use crate::protocol::{self, Frame};
use crate::{ConfigError, ConnectionError, RequestError, RequestResult, SyncError};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

/// Lifecycle state of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Handshaking,
    Open,
    Closing,
}

/// Fixed parameters of a connection
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Socket URL including the protocol query parameters
    pub url: Url,

    /// Token sent in the handshake frame
    pub client_token: String,

    /// Time allowed from `connect` to the Open state
    pub handshake_timeout: Duration,
}

impl ConnectionSettings {
    /// Builds settings from the `[connection]` config section
    pub fn from_config(config: &ConnectionConfig) -> Result<Self, ConfigError> {
        let client_token = config
            .client_token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ConfigError::Validation("client-token is not set".to_string()))?;

        Ok(Self {
            url: endpoint_url(config)?,
            client_token,
            handshake_timeout: Duration::from_millis(config.handshake_timeout),
        })
    }
}

type OpenedSender = oneshot::Sender<Result<String, ConnectionError>>;

/// Mutable link state, guarded by one lock
struct Link {
    state: ConnectionState,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    session_id: Option<String>,
    opened: Option<OpenedSender>,
    reader: Option<JoinHandle<()>>,
}

struct Inner {
    settings: ConnectionSettings,
    handshake: String,
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionSupplier>,
    table: CorrelationTable,
    link: Mutex<Link>,
}

/// Handle to the socket connection
///
/// Cloning is cheap; every clone drives the same link and correlation table.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Creates a disconnected connection over the given transport
    pub fn new(
        settings: ConnectionSettings,
        transport: impl Transport,
        session: impl SessionSupplier,
    ) -> Self {
        Self::with_parts(settings, Arc::new(transport), Arc::new(session))
    }

    /// Creates a disconnected connection from shared parts
    pub fn with_parts(
        settings: ConnectionSettings,
        transport: Arc<dyn Transport>,
        session: Arc<dyn SessionSupplier>,
    ) -> Self {
        let handshake = protocol::encode_handshake(&settings.client_token);
        Self {
            inner: Arc::new(Inner {
                settings,
                handshake,
                transport,
                session,
                table: CorrelationTable::new(),
                link: Mutex::new(Link {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    outbound: None,
                    session_id: None,
                    opened: None,
                    reader: None,
                }),
            }),
        }
    }

    /// Creates the production connection: WebSocket transport, with HTTP
    /// session prefetch when `session-url` is configured
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let settings = ConnectionSettings::from_config(&config.connection)?;
        let transport = WebSocketTransport::new(
            config.user_agent.header_value(),
            config.connection.origin.clone(),
        );

        let session: Arc<dyn SessionSupplier> = match &config.connection.session_url {
            Some(url) => Arc::new(HttpSessionPrefetch::new(url.clone(), &config.user_agent)?),
            None => Arc::new(StaticSession::default()),
        };

        Ok(Self::with_parts(settings, Arc::new(transport), session))
    }

    /// Opens the link and waits for the handshake to complete
    ///
    /// Returns the session id the server assigned. Fails if the connection is
    /// not `Disconnected`, if the link closes or errors before the session id
    /// arrives, or if the whole attempt exceeds the handshake timeout.
    pub async fn connect(&self) -> Result<String, ConnectionError> {
        let generation = self.inner.begin_connect()?;
        let timeout = self.inner.settings.handshake_timeout;

        tracing::info!("Connecting to {}", self.inner.settings.url);

        let result = match tokio::time::timeout(timeout, self.establish(generation)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::HandshakeTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(session_id) => {
                tracing::info!("Connection open (session {})", session_id);
                Ok(session_id)
            }
            Err(e) => {
                self.inner.teardown(generation, &e.to_string());
                Err(e)
            }
        }
    }

    async fn establish(&self, generation: u64) -> Result<String, ConnectionError> {
        let header = self.inner.session.session_header().await?;
        let link = self
            .inner
            .transport
            .open(&self.inner.settings.url, header.as_deref())
            .await?;

        let opened = {
            let mut state = self.inner.link.lock();
            if state.generation != generation || state.state != ConnectionState::Connecting {
                return Err(ConnectionError::ClosedBeforeHandshake(
                    "connection closed while opening".to_string(),
                ));
            }

            let (opened_tx, opened_rx) = oneshot::channel();
            state.state = ConnectionState::Handshaking;
            state.outbound = Some(link.outbound);
            state.opened = Some(opened_tx);
            state.reader = Some(tokio::spawn(
                Arc::clone(&self.inner).read_loop(generation, link.inbound),
            ));
            tracing::debug!("Link open, waiting for session id");
            opened_rx
        };

        match opened.await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::ClosedBeforeHandshake(
                "handshake abandoned".to_string(),
            )),
        }
    }

    /// Writes a raw frame to the socket
    ///
    /// Only succeeds while `Open`; nothing is ever queued for later.
    pub fn send(&self, raw: String) -> RequestResult<()> {
        let link = self.inner.link.lock();
        if link.state != ConnectionState::Open {
            return Err(RequestError::NotConnected);
        }

        match &link.outbound {
            Some(outbound) => outbound.send(raw).map_err(|_| RequestError::NotConnected),
            None => Err(RequestError::NotConnected),
        }
    }

    /// Closes the link and rejects every pending request
    pub fn close(&self) {
        let generation = {
            let mut link = self.inner.link.lock();
            if link.state == ConnectionState::Disconnected {
                return;
            }
            link.state = ConnectionState::Closing;
            link.generation
        };

        self.inner.teardown(generation, "closed by client");
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.inner.link.lock().state
    }

    /// Returns whether requests can be sent
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Session id of the current link, once the handshake completed
    pub fn session_id(&self) -> Option<String> {
        self.inner.link.lock().session_id.clone()
    }

    /// Correlation table the inbound responses are routed into
    pub fn correlation_table(&self) -> &CorrelationTable {
        &self.inner.table
    }

    /// Number of requests waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.inner.table.len()
    }
}

impl Inner {
    fn begin_connect(&self) -> Result<u64, ConnectionError> {
        let mut link = self.link.lock();
        if link.state != ConnectionState::Disconnected {
            return Err(ConnectionError::InvalidState(link.state));
        }

        link.state = ConnectionState::Connecting;
        link.generation += 1;
        Ok(link.generation)
    }

    async fn read_loop(
        self: Arc<Self>,
        generation: u64,
        mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let reason = loop {
            match inbound.recv().await {
                Some(TransportEvent::Message(raw)) => self.dispatch(generation, &raw),
                Some(TransportEvent::Closed(reason)) => {
                    break reason.unwrap_or_else(|| "closed by server".to_string())
                }
                Some(TransportEvent::Error(error)) => break format!("transport error: {}", error),
                None => break "transport ended".to_string(),
            }
        };

        self.teardown(generation, &reason);
    }

    /// Handles one inbound message; frames are processed strictly in order
    fn dispatch(&self, generation: u64, raw: &str) {
        match Frame::parse(raw) {
            Frame::Control { id: protocol::PING } => {
                // Must go out before anything else is looked at
                if !self.write(generation, protocol::PONG.to_string()) {
                    tracing::debug!("Ping arrived on a link that can no longer write");
                }
            }
            Frame::Control { id } => tracing::trace!(id, "Ignoring control frame"),
            Frame::Response {
                correlation_id,
                payload,
            } => self.on_response(correlation_id, &payload),
            Frame::Push { id, payload } => self.on_push(generation, id, &payload),
        }
    }

    fn on_response(&self, id: u64, payload: &str) {
        let delivered = match serde_json::from_str::<Value>(payload) {
            Ok(Value::Array(items)) => {
                let result = items.into_iter().next().unwrap_or(Value::Null);
                self.table.resolve(id, result)
            }
            Ok(other) => self.table.reject(
                id,
                RequestError::MalformedResponse {
                    id,
                    message: format!("expected a JSON array, got {}", other),
                },
            ),
            Err(e) => self.table.reject(
                id,
                RequestError::MalformedResponse {
                    id,
                    message: e.to_string(),
                },
            ),
        };

        if !delivered {
            tracing::debug!(id, "Dropping response with no pending request");
        }
    }

    fn on_push(&self, generation: u64, id: u64, payload: &str) {
        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(id, "Ignoring undecodable frame: {}", e);
                return;
            }
        };

        match value.get("sid").and_then(Value::as_str) {
            Some(session_id) => self.on_session(generation, session_id),
            None => tracing::debug!(id, "Ignoring unsolicited push"),
        }
    }

    fn on_session(&self, generation: u64, session_id: &str) {
        let opened = {
            let mut link = self.link.lock();
            if link.generation != generation {
                return;
            }

            match link.state {
                ConnectionState::Handshaking => {
                    link.state = ConnectionState::Open;
                    link.session_id = Some(session_id.to_string());
                    if let Some(outbound) = &link.outbound {
                        let _ = outbound.send(self.handshake.clone());
                    }
                    link.opened.take()
                }
                ConnectionState::Open => {
                    tracing::debug!("Session id refreshed to {}", session_id);
                    link.session_id = Some(session_id.to_string());
                    None
                }
                _ => None,
            }
        };

        if let Some(opened) = opened {
            let _ = opened.send(Ok(session_id.to_string()));
        }
    }

    /// Writes a protocol-level frame (pong) while the link is alive
    fn write(&self, generation: u64, raw: String) -> bool {
        let link = self.link.lock();
        if link.generation != generation {
            return false;
        }

        match (&link.state, &link.outbound) {
            (ConnectionState::Handshaking | ConnectionState::Open, Some(outbound)) => {
                outbound.send(raw).is_ok()
            }
            _ => false,
        }
    }

    /// Moves the given generation to `Disconnected` and fails everything
    /// waiting on it
    fn teardown(&self, generation: u64, reason: &str) {
        let (opened, reader) = {
            let mut link = self.link.lock();
            if link.generation != generation || link.state == ConnectionState::Disconnected {
                return;
            }

            tracing::info!("Connection {:?} -> Disconnected: {}", link.state, reason);
            link.state = ConnectionState::Disconnected;
            link.outbound = None;
            link.session_id = None;
            (link.opened.take(), link.reader.take())
        };

        if let Some(opened) = opened {
            let _ = opened.send(Err(ConnectionError::ClosedBeforeHandshake(
                reason.to_string(),
            )));
        }

        let rejected = self
            .table
            .drain_all(RequestError::ConnectionClosed(reason.to_string()));
        if rejected > 0 {
            tracing::warn!("Rejected {} pending requests: {}", rejected, reason);
        }

        if let Some(reader) = reader {
            reader.abort();
        }
    }
}
