//! In-process transport
//!
//! Every `open` creates a fresh channel pair and hands the server side to the
//! paired [`MemoryListener`] as a [`MemoryPeer`], which plays the game service
//! in tests.

use crate::connection::transport::{Transport, TransportEvent, TransportLink};
use crate::ConnectionError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

/// How a [`MemoryTransport`] answers `open`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryBehavior {
    /// Open the link and hand the peer to the listener
    Accept,

    /// Fail immediately, like a refused TCP connection
    Refuse,

    /// Never complete, like a socket that never opens
    Hang,
}

/// Transport whose links stay inside the process
#[derive(Clone)]
pub struct MemoryTransport {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    behavior: Arc<Mutex<MemoryBehavior>>,
}

/// Receives the server side of every link opened through the transport
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Server side of one in-memory link
pub struct MemoryPeer {
    /// Session header the client opened the link with
    pub session_header: Option<String>,

    /// URL the client opened
    pub url: Url,

    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryTransport {
    /// Creates a transport that accepts every link
    pub fn new() -> (Self, MemoryListener) {
        Self::with_behavior(MemoryBehavior::Accept)
    }

    /// Creates a transport with the given `open` behavior
    pub fn with_behavior(behavior: MemoryBehavior) -> (Self, MemoryListener) {
        let (peers, listener) = mpsc::unbounded_channel();
        (
            Self {
                peers,
                behavior: Arc::new(Mutex::new(behavior)),
            },
            MemoryListener { peers: listener },
        )
    }

    /// Changes how later `open` calls behave
    pub fn set_behavior(&self, behavior: MemoryBehavior) {
        *self.behavior.lock() = behavior;
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(
        &self,
        url: &Url,
        session_header: Option<&str>,
    ) -> Result<TransportLink, ConnectionError> {
        let behavior = *self.behavior.lock();
        match behavior {
            MemoryBehavior::Accept => {}
            MemoryBehavior::Refuse => {
                return Err(ConnectionError::Transport("connection refused".to_string()))
            }
            MemoryBehavior::Hang => std::future::pending::<()>().await,
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            session_header: session_header.map(str::to_string),
            url: url.clone(),
            from_client,
            to_client,
        };
        self.peers
            .send(peer)
            .map_err(|_| ConnectionError::Transport("listener dropped".to_string()))?;

        Ok(TransportLink { outbound, inbound })
    }
}

impl MemoryListener {
    /// Waits for the next link to be opened
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }
}

impl MemoryPeer {
    /// Sends a raw message to the client
    pub fn send(&self, raw: impl Into<String>) -> bool {
        self.to_client
            .send(TransportEvent::Message(raw.into()))
            .is_ok()
    }

    /// Waits for the next message the client wrote
    ///
    /// Returns `None` once the client has dropped its side of the link.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Returns the next message the client wrote, if one is already queued
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Closes the link from the server side
    pub fn close(&self, reason: Option<&str>) {
        let _ = self
            .to_client
            .send(TransportEvent::Closed(reason.map(str::to_string)));
    }

    /// Fails the link from the server side
    pub fn fail(&self, error: &str) {
        let _ = self.to_client.send(TransportEvent::Error(error.to_string()));
    }
}
